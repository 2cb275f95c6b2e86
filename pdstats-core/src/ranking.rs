use std::collections::HashMap;

use serde::Serialize;

use crate::incident::Incident;

/// One distinct description and the incidents behind its count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankingEntry<'a> {
    pub description: String,
    pub count: usize,
    pub incidents: Vec<&'a Incident>,
}

/// Most frequent descriptions, highest count first. Equal counts keep the
/// order in which descriptions were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ranking<'a> {
    pub entries: Vec<RankingEntry<'a>>,
}

impl<'a> Ranking<'a> {
    pub fn top<I>(incidents: I, top_count: usize) -> Self
    where
        I: IntoIterator<Item = &'a Incident>,
    {
        let mut index: HashMap<&'a str, usize> = HashMap::new();
        let mut entries: Vec<RankingEntry<'a>> = Vec::new();
        for incident in incidents {
            let position = *index
                .entry(incident.description.as_str())
                .or_insert_with(|| {
                    entries.push(RankingEntry {
                        description: incident.description.clone(),
                        count: 0,
                        incidents: Vec::new(),
                    });
                    entries.len() - 1
                });
            let entry = &mut entries[position];
            entry.count += 1;
            entry.incidents.push(incident);
        }

        // Stable sort: ties stay in first-seen order.
        entries.sort_by(|a, b| b.count.cmp(&a.count));
        entries.truncate(top_count);
        tracing::debug!(
            distinct = index.len(),
            kept = entries.len(),
            top_count,
            "ranked incident descriptions"
        );
        Self { entries }
    }

    pub fn get(&self, description: &str) -> Option<&RankingEntry<'a>> {
        self.entries
            .iter()
            .find(|entry| entry.description == description)
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|entry| entry.count).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
