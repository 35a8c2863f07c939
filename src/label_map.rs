//! Label-map compilation: schema locator specs become typed locators once per job.

use crate::error::{TabulateError, TabulateResult};
use crate::source::{FormatKind, SchemaValue};

const FORCE_PREFIX: &str = "force:";

/// Element-name chain searched below a record element (`.//a/b`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreePath {
    pub segments: Vec<String>,
}

impl TreePath {
    pub fn parse(spec: &str) -> TabulateResult<Self> {
        let segments: Vec<String> = spec.split('/').map(str::to_string).collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(TabulateError::config(format!("'{spec}' is not a valid element path")));
        }
        Ok(Self { segments })
    }
}

/// Where one value comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Locator {
    /// Emitted verbatim, no lookup.
    Literal(String),
    /// Field name or object key (or JSON pointer when it starts with `/`).
    Field(String),
    /// Descendant element path for tree formats.
    Path(TreePath),
}

impl Locator {
    /// Compile one locator spec for the given format kind.
    pub fn compile(spec: &str, kind: FormatKind) -> TabulateResult<Self> {
        if let Some(payload) = spec.strip_prefix(FORCE_PREFIX) {
            if payload.is_empty() {
                return Err(TabulateError::config(format!("force value '{spec}' has no payload")));
            }
            return Ok(Self::Literal(payload.to_string()));
        }
        Self::reference(spec, kind)
    }

    /// Compile a plain reference (filter keys never carry force values).
    pub fn reference(spec: &str, kind: FormatKind) -> TabulateResult<Self> {
        if spec.is_empty() {
            return Err(TabulateError::config("empty field reference"));
        }
        match kind {
            FormatKind::Tree => Ok(Self::Path(TreePath::parse(spec)?)),
            FormatKind::Delimited | FormatKind::Object => Ok(Self::Field(spec.to_string())),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

/// Locator(s) for one output column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnLocator {
    Single(Locator),
    /// Resolved independently and joined with a single space.
    Concat(Vec<Locator>),
}

/// Output column name -> locator(s), in header order. Immutable once compiled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelMap {
    columns: Vec<(String, ColumnLocator)>,
}

impl LabelMap {
    pub fn compile(schema: &[(String, SchemaValue)], kind: FormatKind) -> TabulateResult<Self> {
        let mut columns = Vec::with_capacity(schema.len());
        for (name, value) in schema {
            let col = match value {
                SchemaValue::One(spec) => ColumnLocator::Single(Locator::compile(spec, kind)?),
                SchemaValue::Many(specs) => {
                    if specs.is_empty() {
                        return Err(TabulateError::config(format!("column '{name}' has an empty locator list")));
                    }
                    ColumnLocator::Concat(
                        specs
                            .iter()
                            .map(|s| Locator::compile(s, kind))
                            .collect::<TabulateResult<Vec<_>>>()?,
                    )
                }
            };
            columns.push((name.clone(), col));
        }
        Ok(Self { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnLocator)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }
    /// Every non-literal locator, for readers that want to warn about unknown fields.
    pub fn references(&self) -> impl Iterator<Item = &Locator> {
        self.columns
            .iter()
            .flat_map(|(_, c)| match c {
                ColumnLocator::Single(l) => std::slice::from_ref(l).iter(),
                ColumnLocator::Concat(ls) => ls.iter(),
            })
            .filter(|l| !l.is_literal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(items: &[(&str, SchemaValue)]) -> Vec<(String, SchemaValue)> {
        items.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn tree_references_become_paths_and_literals_stay() {
        let s = schema(&[
            ("name", "store/name".into()),
            ("street", ["force:Main St", "num"].into()),
        ]);
        let map = LabelMap::compile(&s, FormatKind::Tree).unwrap();
        let cols: Vec<_> = map.iter().collect();
        assert_eq!(cols[0].0, "name");
        assert_eq!(
            cols[0].1,
            &ColumnLocator::Single(Locator::Path(TreePath { segments: vec!["store".into(), "name".into()] }))
        );
        assert_eq!(
            cols[1].1,
            &ColumnLocator::Concat(vec![
                Locator::Literal("Main St".into()),
                Locator::Path(TreePath { segments: vec!["num".into()] }),
            ])
        );
        assert_eq!(map.references().count(), 2);
    }

    #[test]
    fn delimited_references_stay_field_names() {
        let s = schema(&[("city", "CITY".into())]);
        let map = LabelMap::compile(&s, FormatKind::Delimited).unwrap();
        assert_eq!(map.iter().next().unwrap().1, &ColumnLocator::Single(Locator::Field("CITY".into())));
    }

    #[test]
    fn force_payload_keeps_everything_after_prefix() {
        assert_eq!(
            Locator::compile("force:http://example.org", FormatKind::Delimited).unwrap(),
            Locator::Literal("http://example.org".into())
        );
    }

    #[test]
    fn malformed_locators_are_config_errors() {
        for bad in ["force:", ""] {
            let err = Locator::compile(bad, FormatKind::Delimited).unwrap_err();
            assert!(matches!(err, TabulateError::Config(_)));
        }
        assert!(Locator::compile("a//b", FormatKind::Tree).is_err());
        let s = schema(&[("x", SchemaValue::Many(vec![]))]);
        assert!(LabelMap::compile(&s, FormatKind::Object).is_err());
    }

    #[test]
    fn header_order_follows_schema_order() {
        let s = schema(&[("b", "B".into()), ("a", "A".into()), ("c", "force:x".into())]);
        let map = LabelMap::compile(&s, FormatKind::Object).unwrap();
        assert_eq!(map.column_names().collect::<Vec<_>>(), ["b", "a", "c"]);
    }
}
