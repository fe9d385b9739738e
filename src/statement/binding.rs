use std::fmt;

use crate::error::SqlBridgeError;
use crate::registry::BindValue;

use super::scanner::ParameterLayout;

/// Which parameter slot a bind addresses: a zero-based position or a marker name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindTarget {
    Index(usize),
    Name(String),
}

impl From<usize> for BindTarget {
    fn from(index: usize) -> Self {
        BindTarget::Index(index)
    }
}

impl From<&str> for BindTarget {
    fn from(name: &str) -> Self {
        BindTarget::Name(name.to_owned())
    }
}

impl From<String> for BindTarget {
    fn from(name: String) -> Self {
        BindTarget::Name(name)
    }
}

impl fmt::Display for BindTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindTarget::Index(index) => write!(f, "parameter {index}"),
            BindTarget::Name(name) => write!(f, "parameter :{}", name.trim_start_matches(':')),
        }
    }
}

/// Encoded bind values for the row being built plus every completed batch row.
#[derive(Debug)]
pub(crate) struct BindingSet {
    current: Vec<Option<BindValue>>,
    rows: Vec<Vec<BindValue>>,
}

impl BindingSet {
    pub(crate) fn new(width: usize) -> Self {
        Self {
            current: std::iter::repeat_with(|| None).take(width).collect(),
            rows: Vec::new(),
        }
    }

    pub(crate) fn resolve(
        &self,
        layout: &ParameterLayout,
        target: &BindTarget,
    ) -> Result<usize, SqlBridgeError> {
        layout.check()?;
        let slot = match target {
            BindTarget::Index(index) if *index < self.current.len() => Some(*index),
            BindTarget::Index(_) => None,
            BindTarget::Name(name) => layout.slot_of(name),
        };
        slot.ok_or_else(|| {
            SqlBridgeError::validation(format!(
                "{target} does not exist; the statement has {} parameter(s)",
                self.current.len()
            ))
        })
    }

    /// Store an already encoded value. Rebinding a slot replaces the earlier value.
    pub(crate) fn set(&mut self, slot: usize, value: BindValue) {
        self.current[slot] = Some(value);
    }

    fn unbound(&self, layout: &ParameterLayout) -> Vec<String> {
        self.current
            .iter()
            .enumerate()
            .filter(|(_, value)| value.is_none())
            .map(|(slot, _)| match layout.names.get(slot).cloned().flatten() {
                Some(name) => format!(":{name}"),
                None => format!("#{slot}"),
            })
            .collect()
    }

    fn is_untouched(&self) -> bool {
        self.current.iter().all(Option::is_none)
    }

    /// Close the current row and start a new one. On failure nothing changes.
    pub(crate) fn complete_row(&mut self, layout: &ParameterLayout) -> Result<(), SqlBridgeError> {
        layout.check()?;
        let unbound = self.unbound(layout);
        if !unbound.is_empty() {
            return Err(SqlBridgeError::validation(format!(
                "batch row {} leaves {} unbound",
                self.rows.len() + 1,
                unbound.join(", ")
            )));
        }
        let width = self.current.len();
        let row = std::mem::replace(
            &mut self.current,
            std::iter::repeat_with(|| None).take(width).collect(),
        );
        self.rows.push(row.into_iter().flatten().collect());
        Ok(())
    }

    /// Every row to execute, validated as a whole.
    ///
    /// A row left untouched after [`BindingSet::complete_row`] is not a row.
    pub(crate) fn finish(
        mut self,
        layout: &ParameterLayout,
    ) -> Result<Vec<Vec<BindValue>>, SqlBridgeError> {
        layout.check()?;
        if self.current.is_empty() {
            if self.rows.is_empty() {
                self.rows.push(Vec::new());
            }
            return Ok(self.rows);
        }
        if !(self.is_untouched() && !self.rows.is_empty()) {
            self.complete_row(layout)?;
        }
        Ok(self.rows)
    }

    #[cfg(test)]
    pub(crate) fn completed_rows(&self) -> usize {
        self.rows.len()
    }
}
