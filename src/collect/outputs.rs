//! Requested optional output tables.

use crate::collect::Note;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An output table produced only on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionalTable {
    /// Parameter estimates.
    OutEst,
    /// Forecast components.
    OutComp,
    /// Event definitions.
    OutEvent,
    /// Event dummy variables.
    OutEventDummy,
    /// Independent variables.
    OutIndep,
    /// Model selection graph specification.
    OutFmsg,
}

impl OptionalTable {
    pub const ALL: [OptionalTable; 6] = [
        OptionalTable::OutEst,
        OptionalTable::OutComp,
        OptionalTable::OutEvent,
        OptionalTable::OutEventDummy,
        OptionalTable::OutIndep,
        OptionalTable::OutFmsg,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OptionalTable::OutEst => "outest",
            OptionalTable::OutComp => "outcomp",
            OptionalTable::OutEvent => "outevent",
            OptionalTable::OutEventDummy => "outeventdummy",
            OptionalTable::OutIndep => "outindep",
            OptionalTable::OutFmsg => "outfmsg",
        }
    }

    fn requires_events(self) -> bool {
        matches!(self, OptionalTable::OutEvent | OptionalTable::OutEventDummy)
    }

    fn requires_inputs(self) -> bool {
        self == OptionalTable::OutIndep
    }
}

/// Set of requested optional tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionalOutputs {
    tables: BTreeSet<OptionalTable>,
}

impl OptionalOutputs {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            tables: OptionalTable::ALL.into_iter().collect(),
        }
    }

    pub fn with(mut self, table: OptionalTable) -> Self {
        self.tables.insert(table);
        self
    }

    pub fn contains(&self, table: OptionalTable) -> bool {
        self.tables.contains(&table)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = OptionalTable> + '_ {
        self.tables.iter().copied()
    }

    /// Drop requests whose input is absent, with one warning per dropped
    /// table.
    pub fn validate(&self, has_events: bool, has_inputs: bool) -> (OptionalOutputs, Vec<Note>) {
        let mut warnings = Vec::new();
        let tables = self
            .iter()
            .filter(|table| {
                let missing = if table.requires_events() && !has_events {
                    Some("no events are defined")
                } else if table.requires_inputs() && !has_inputs {
                    Some("no independent variables are defined")
                } else {
                    None
                };
                if let Some(reason) = missing {
                    warnings.push(Note::warning(format!(
                        "{} was requested but {reason}, the table is not produced",
                        table.name().to_uppercase()
                    )));
                }
                missing.is_none()
            })
            .collect();
        (OptionalOutputs { tables }, warnings)
    }
}
