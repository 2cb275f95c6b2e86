use serde::Serialize;

use crate::incident::Incident;

/// Mean time to resolution over a set of resolved incidents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MtrSummary {
    pub incidents: usize,
    pub mean_seconds: i64,
}

impl MtrSummary {
    /// Each interval is truncated to whole seconds before averaging and the
    /// mean is floored. An empty set has a mean of 0.
    pub fn from_resolved<'a, I>(incidents: I) -> Self
    where
        I: IntoIterator<Item = &'a Incident>,
    {
        let (count, total) = incidents
            .into_iter()
            .fold((0usize, 0i64), |(count, total), incident| {
                (count + 1, total + incident.time_to_resolution().num_seconds())
            });
        if count == 0 {
            return Self::default();
        }
        Self {
            incidents: count,
            mean_seconds: total.div_euclid(count as i64),
        }
    }
}

pub fn mean_time_to_resolution<'a, I>(incidents: I) -> i64
where
    I: IntoIterator<Item = &'a Incident>,
{
    MtrSummary::from_resolved(incidents).mean_seconds
}
