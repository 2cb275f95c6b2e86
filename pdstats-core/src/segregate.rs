use serde::Serialize;

use crate::incident::Incident;

/// Production and staging populations of one filtered set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Segregation<'a> {
    pub production: Vec<&'a Incident>,
    pub staging: Vec<&'a Incident>,
}

impl<'a> Segregation<'a> {
    pub fn len(&self) -> usize {
        self.production.len() + self.staging.len()
    }

    pub fn is_empty(&self) -> bool {
        self.production.is_empty() && self.staging.is_empty()
    }
}

/// Splits on a case-sensitive substring of the description. Order is kept
/// within each side.
pub fn segregate<'a, I>(incidents: I, staging_marker: &str) -> Segregation<'a>
where
    I: IntoIterator<Item = &'a Incident>,
{
    let (staging, production) = incidents
        .into_iter()
        .partition(|incident| incident.description.contains(staging_marker));
    Segregation {
        production,
        staging,
    }
}
