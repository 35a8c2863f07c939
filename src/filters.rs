//! Row filter: every (field, regex) pair must find a match in the raw record.

use crate::error::{TabulateError, TabulateResult};
use crate::label_map::Locator;
use crate::reader::RawRecord;
use crate::source::FormatKind;
use regex::Regex;

#[derive(Clone, Debug, Default)]
pub struct RowFilter {
    rules: Vec<(Locator, Regex)>,
}

impl RowFilter {
    pub fn compile(spec: &[(String, String)], kind: FormatKind) -> TabulateResult<Self> {
        let mut rules = Vec::with_capacity(spec.len());
        for (field, pattern) in spec {
            let re = Regex::new(pattern)
                .map_err(|e| TabulateError::config(format!("filter '{field}': {e}")))?;
            rules.push((Locator::reference(field, kind)?, re));
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// AND over all rules; missing values are matched as "".
    pub fn keep<R: RawRecord>(&self, rec: &R) -> bool {
        self.rules.iter().all(|(loc, re)| re.is_match(&rec.lookup(loc)))
    }
}
