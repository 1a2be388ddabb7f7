//! Dated markers for macro events worth pointing out on a chart.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacroEvent {
    pub date: NaiveDate,
    pub label: String,
}

impl MacroEvent {
    pub fn new(date: NaiveDate, label: impl Into<String>) -> Self {
        Self {
            date,
            label: label.into(),
        }
    }
}

/// Events marked when the configuration does not list its own.
pub fn default_events() -> Vec<MacroEvent> {
    [
        ((2008, 9, 15), "Lehman Brothers Bankruptcy"),
        ((2020, 3, 15), "COVID Stimulus Start"),
        ((2022, 3, 16), "Fed Begins Rate Hikes"),
    ]
    .into_iter()
    .filter_map(|((y, m, d), label)| Some(MacroEvent::new(NaiveDate::from_ymd_opt(y, m, d)?, label)))
    .collect()
}

/// Events dated from `first` through `last`, both inclusive, in date order.
pub fn events_in(events: &[MacroEvent], first: NaiveDate, last: NaiveDate) -> Vec<MacroEvent> {
    let mut inside: Vec<MacroEvent> = events
        .iter()
        .filter(|e| (first..=last).contains(&e.date))
        .cloned()
        .collect();
    inside.sort_by_key(|e| e.date);
    inside
}
