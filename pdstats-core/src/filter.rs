//! Lazy incident filters.
//!
//! Every stage borrows from the batch held by the caller and yields the
//! matching incidents in input order. Stages never mutate anything; to run a
//! stage again, call it again on the source batch.

use std::fmt;

use chrono::{Datelike, Duration, NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::config::AnalysisSection;
use crate::incident::Incident;

/// Thresholds used by the wakeup and flake predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationRules {
    pub zone: Tz,
    pub night_start: NaiveTime,
    pub morning_end: NaiveTime,
    pub flake_threshold: Duration,
}

impl ClassificationRules {
    pub fn from_analysis(analysis: &AnalysisSection) -> Self {
        Self {
            zone: analysis.timezone,
            night_start: hour_of_day(analysis.night_start_hour),
            morning_end: hour_of_day(analysis.morning_end_hour),
            flake_threshold: Duration::minutes(analysis.flake_threshold_minutes),
        }
    }

    /// Created strictly after the night start or strictly before the morning
    /// end, on the local wall clock.
    pub fn is_wakeup(&self, incident: &Incident) -> bool {
        let time = incident.created_local(self.zone).time();
        time > self.night_start || time < self.morning_end
    }

    /// Resolved quickly with no human attributed and never acknowledged.
    ///
    /// Both the actor check and the log scan are kept: an incident can be
    /// acknowledged by someone and still be resolved by the integration.
    pub fn is_flake(&self, incident: &Incident) -> bool {
        incident.is_resolved()
            && incident.time_to_resolution() < self.flake_threshold
            && incident.last_status_change_by.is_none()
            && !incident.was_acknowledged()
    }
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self::from_analysis(&AnalysisSection::default())
    }
}

fn hour_of_day(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Which incident subset a report is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentCommand {
    All,
    Wakeups,
    Flakes,
}

impl fmt::Display for IncidentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncidentCommand::All => write!(f, "all"),
            IncidentCommand::Wakeups => write!(f, "wakeups"),
            IncidentCommand::Flakes => write!(f, "flakes"),
        }
    }
}

/// Filter stages scoped to one escalation policy.
#[derive(Debug, Clone)]
pub struct FilterPipeline {
    policy: String,
    rules: ClassificationRules,
}

impl FilterPipeline {
    pub fn new(policy: impl Into<String>, rules: ClassificationRules) -> Self {
        Self {
            policy: policy.into(),
            rules,
        }
    }

    pub fn policy(&self) -> &str {
        &self.policy
    }

    pub fn rules(&self) -> &ClassificationRules {
        &self.rules
    }

    /// Incidents owned by the configured escalation policy.
    pub fn scoped<'a, I>(&'a self, incidents: I) -> impl Iterator<Item = &'a Incident> + 'a
    where
        I: IntoIterator<Item = &'a Incident>,
        I::IntoIter: 'a,
    {
        incidents
            .into_iter()
            .filter(move |incident| incident.escalation_policy_id == self.policy)
    }

    pub fn resolved<'a, I>(&'a self, incidents: I) -> impl Iterator<Item = &'a Incident> + 'a
    where
        I: IntoIterator<Item = &'a Incident>,
        I::IntoIter: 'a,
    {
        self.scoped(incidents).filter(|incident| incident.is_resolved())
    }

    pub fn wakeups<'a, I>(&'a self, incidents: I) -> impl Iterator<Item = &'a Incident> + 'a
    where
        I: IntoIterator<Item = &'a Incident>,
        I::IntoIter: 'a,
    {
        self.scoped(incidents)
            .filter(move |incident| self.rules.is_wakeup(incident))
    }

    pub fn flakes<'a, I>(&'a self, incidents: I) -> impl Iterator<Item = &'a Incident> + 'a
    where
        I: IntoIterator<Item = &'a Incident>,
        I::IntoIter: 'a,
    {
        self.resolved(incidents)
            .filter(move |incident| self.rules.is_flake(incident))
    }

    /// Dispatches to the stage named by `command`.
    pub fn select<'a, I>(
        &'a self,
        command: IncidentCommand,
        incidents: I,
    ) -> Box<dyn Iterator<Item = &'a Incident> + 'a>
    where
        I: IntoIterator<Item = &'a Incident>,
        I::IntoIter: 'a,
    {
        match command {
            IncidentCommand::All => Box::new(self.scoped(incidents)),
            IncidentCommand::Wakeups => Box::new(self.wakeups(incidents)),
            IncidentCommand::Flakes => Box::new(self.flakes(incidents)),
        }
    }
}

/// Drops incidents created on `weekday` in `zone`.
pub fn exclude_weekday<'a, I>(
    incidents: I,
    weekday: Weekday,
    zone: Tz,
) -> impl Iterator<Item = &'a Incident>
where
    I: IntoIterator<Item = &'a Incident>,
{
    incidents
        .into_iter()
        .filter(move |incident| incident.created_local(zone).weekday() != weekday)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::fixtures::{incident, instant};
    use crate::incident::{Actor, IncidentStatus, LogEntry};

    fn pipeline() -> FilterPipeline {
        FilterPipeline::new("POPS", ClassificationRules::default())
    }

    // Pacific wall clock in January is UTC-8.
    fn created_at_pacific(id: &str, local: &str) -> Incident {
        let utc = instant(&format!("{local}-08:00"));
        let mut item = incident(id, "disk full", "2015-01-01T00:00:00Z", "2015-01-01T00:00:00Z");
        item.created_at = utc;
        item.last_status_change_at = utc + Duration::hours(1);
        item
    }

    #[test]
    fn scope_keeps_only_matching_policy() {
        let mut other = incident("B", "x", "2015-01-01T00:00:00Z", "2015-01-01T01:00:00Z");
        other.escalation_policy_id = "PDEV".to_string();
        let batch = vec![
            incident("A", "x", "2015-01-01T00:00:00Z", "2015-01-01T01:00:00Z"),
            other,
            incident("C", "x", "2015-01-01T00:00:00Z", "2015-01-01T01:00:00Z"),
        ];
        let pipeline = pipeline();
        let ids: Vec<_> = pipeline.scoped(&batch).map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["A", "C"]);

        let unknown = FilterPipeline::new("PNONE", ClassificationRules::default());
        assert_eq!(unknown.scoped(&batch).count(), 0);
    }

    #[test]
    fn resolved_stage_drops_open_incidents() {
        let mut open = incident("B", "x", "2015-01-01T00:00:00Z", "2015-01-01T00:01:00Z");
        open.status = IncidentStatus::Triggered;
        let batch = vec![
            incident("A", "x", "2015-01-01T00:00:00Z", "2015-01-01T01:00:00Z"),
            open,
        ];
        let pipeline = pipeline();
        let ids: Vec<_> = pipeline.resolved(&batch).map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["A"]);
    }

    #[test]
    fn wakeup_boundaries() {
        let rules = ClassificationRules::default();
        assert!(rules.is_wakeup(&created_at_pacific("late", "2015-01-05T23:01:00")));
        assert!(rules.is_wakeup(&created_at_pacific("early", "2015-01-05T07:59:00")));
        assert!(!rules.is_wakeup(&created_at_pacific("morning", "2015-01-05T08:00:00")));
        assert!(!rules.is_wakeup(&created_at_pacific("evening", "2015-01-05T22:59:00")));
        assert!(!rules.is_wakeup(&created_at_pacific("eleven", "2015-01-05T23:00:00")));
        assert!(rules.is_wakeup(&created_at_pacific("midnight", "2015-01-05T00:00:00")));
    }

    #[test]
    fn wakeup_follows_daylight_saving_time() {
        // 07:30 PDT is 14:30Z; a UTC-8 reading would make it 06:30.
        let summer = incident("S", "x", "2015-07-01T14:30:00Z", "2015-07-01T15:00:00Z");
        assert!(!ClassificationRules::default().is_wakeup(&summer));
    }

    #[test]
    fn flake_scenario() {
        let rules = ClassificationRules::default();
        let mut quick = incident("F", "x", "2015-01-05T18:00:00Z", "2015-01-05T18:09:59Z");
        assert!(rules.is_flake(&quick));

        quick
            .log_entries
            .push(LogEntry::new("acknowledge_log_entry", None));
        assert!(!rules.is_flake(&quick));
    }

    #[test]
    fn flake_requires_every_condition() {
        let rules = ClassificationRules::default();
        let exactly_ten = incident("T", "x", "2015-01-05T18:00:00Z", "2015-01-05T18:10:00Z");
        assert!(!rules.is_flake(&exactly_ten));

        let mut by_human = incident("H", "x", "2015-01-05T18:00:00Z", "2015-01-05T18:01:00Z");
        by_human.last_status_change_by = Some(Actor {
            id: "PUSER".to_string(),
            summary: None,
        });
        assert!(!rules.is_flake(&by_human));

        let mut open = incident("O", "x", "2015-01-05T18:00:00Z", "2015-01-05T18:01:00Z");
        open.status = IncidentStatus::Acknowledged;
        assert!(!rules.is_flake(&open));
    }

    #[test]
    fn flakes_are_a_subset_of_resolved() {
        let mut open = incident("O", "x", "2015-01-05T18:00:00Z", "2015-01-05T18:01:00Z");
        open.status = IncidentStatus::Triggered;
        let batch = vec![
            incident("A", "x", "2015-01-05T18:00:00Z", "2015-01-05T18:01:00Z"),
            open,
            incident("B", "x", "2015-01-05T18:00:00Z", "2015-01-05T19:00:00Z"),
        ];
        let pipeline = pipeline();
        let resolved: Vec<_> = pipeline.resolved(&batch).map(|i| &i.id).collect();
        let flakes: Vec<_> = pipeline.flakes(&batch).map(|i| &i.id).collect();
        assert_eq!(flakes, [&"A".to_string()]);
        assert!(flakes.iter().all(|id| resolved.contains(id)));
    }

    #[test]
    fn select_dispatches_by_command() {
        let batch = vec![
            created_at_pacific("night", "2015-01-05T02:00:00"),
            created_at_pacific("day", "2015-01-05T12:00:00"),
        ];
        let pipeline = pipeline();
        assert_eq!(pipeline.select(IncidentCommand::All, &batch).count(), 2);
        let wakeups: Vec<_> = pipeline
            .select(IncidentCommand::Wakeups, &batch)
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(wakeups, ["night"]);
        assert_eq!(pipeline.select(IncidentCommand::Flakes, &batch).count(), 0);
    }

    #[test]
    fn thursday_exclusion_uses_local_weekday() {
        // 2015-01-08 is a Thursday. 07:00Z Friday is still Thursday 23:00 in Pacific time.
        let batch = vec![
            created_at_pacific("wed", "2015-01-07T12:00:00"),
            created_at_pacific("thu", "2015-01-08T12:00:00"),
            incident("thu-late", "x", "2015-01-09T07:00:00Z", "2015-01-09T08:00:00Z"),
            created_at_pacific("fri", "2015-01-09T12:00:00"),
        ];
        let ids: Vec<_> = exclude_weekday(&batch, Weekday::Thu, chrono_tz::America::Los_Angeles)
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(ids, ["wed", "fri"]);
    }

    #[test]
    fn thursday_exclusion_composes_after_a_stage() {
        let batch = vec![
            created_at_pacific("thu-night", "2015-01-08T02:00:00"),
            created_at_pacific("fri-night", "2015-01-09T02:00:00"),
        ];
        let pipeline = pipeline();
        let rules = *pipeline.rules();
        let ids: Vec<_> = exclude_weekday(pipeline.wakeups(&batch), Weekday::Thu, rules.zone)
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(ids, ["fri-night"]);
    }
}
