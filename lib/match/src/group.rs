//! Match-group resolution.
//!
//! A match group is the set of entities connected to a primary entity
//! directly or through chains of pairwise matches. The match graph is never
//! materialized: BFS expands one node at a time through the match service,
//! bounded by hop count and group size.

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use resolve_core::{EntityData, EntityRecord, Error, Result, HOP_DISTANCE_KEY};

use crate::service::{to_match_result, MatchOptions, MatchResult, MatchService};

/// How group membership is discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStrategy {
    /// Only entities matching the primary directly.
    Direct,
    /// Full BFS over the match graph up to the hop limit.
    Transitive,
    /// High-confidence direct ring, then bounded transitive expansion from
    /// each direct neighbor.
    #[default]
    Hybrid,
}

impl FromStr for GroupStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(GroupStrategy::Direct),
            "transitive" => Ok(GroupStrategy::Transitive),
            "hybrid" => Ok(GroupStrategy::Hybrid),
            other => Err(Error::Validation(format!(
                "unknown match group strategy: {other} (expected direct, transitive or hybrid)"
            ))),
        }
    }
}

impl std::fmt::Display for GroupStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GroupStrategy::Direct => "direct",
            GroupStrategy::Transitive => "transitive",
            GroupStrategy::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Options for match-group retrieval.
#[derive(Debug, Clone, Default)]
pub struct MatchGroupOptions {
    /// Minimum pairwise score for membership; zero selects the configured
    /// default.
    pub threshold: f32,
    /// Maximum entities in the group; zero selects 100.
    pub max_size: usize,
    pub include_scores: bool,
    pub strategy: GroupStrategy,
    /// Maximum transitive hops; zero selects 3.
    pub hops_limit: usize,
    pub field_weights: HashMap<String, f32>,
}

/// Agreement statistics for one field across a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleField {
    /// Modal raw value across members.
    pub value: String,
    /// Fraction of members sharing the modal value.
    pub agreement: f32,
    /// `agreement` weighted by the group score.
    pub confidence: f32,
}

/// A resolved group of entities believed to be the same real-world entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchGroup {
    pub id: String,
    pub primary_id: String,
    /// Members ordered by descending score; the primary is first at 1.0.
    pub entities: Vec<MatchResult>,
    /// Mean member score.
    pub score: f32,
    pub size: usize,
    pub sample_fields: HashMap<String, SampleField>,
}

impl MatchService {
    /// Resolve the match group around `entity_id`.
    ///
    /// Fails only when the primary entity cannot be fetched or its own match
    /// query fails; expansion errors further out are logged and skipped.
    pub async fn get_match_group(
        &self,
        entity_id: &str,
        opts: &MatchGroupOptions,
    ) -> Result<MatchGroup> {
        let threshold = if opts.threshold <= 0.0 {
            self.config().matching.similarity_threshold
        } else {
            opts.threshold
        };
        let max_size = if opts.max_size == 0 { 100 } else { opts.max_size };
        let hops_limit = if opts.hops_limit == 0 { 3 } else { opts.hops_limit };

        let primary = self.store().get(entity_id).await?;

        let mut entities = vec![to_match_result(&primary, 1.0)];
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(primary.id.clone());

        match opts.strategy {
            GroupStrategy::Direct => {
                self.expand_direct(&mut entities, &mut visited, &primary, threshold, max_size, opts)
                    .await?;
            }
            GroupStrategy::Transitive => {
                self.expand_transitive(
                    &mut entities,
                    &mut visited,
                    primary.clone(),
                    threshold,
                    hops_limit,
                    max_size,
                    opts,
                    true,
                )
                .await?;
            }
            GroupStrategy::Hybrid => {
                // High-confidence ring first.
                let direct_threshold = threshold.max(0.9);
                self.expand_direct(
                    &mut entities,
                    &mut visited,
                    &primary,
                    direct_threshold,
                    max_size,
                    opts,
                )
                .await?;

                if hops_limit > 1 {
                    let neighbors: Vec<String> = entities
                        .iter()
                        .skip(1)
                        .map(|m| m.id.clone())
                        .collect();
                    for neighbor_id in neighbors {
                        if entities.len() >= max_size {
                            break;
                        }
                        let neighbor = match self.store().get(&neighbor_id).await {
                            Ok(record) => record,
                            Err(e) => {
                                warn!(id = %neighbor_id, error = %e, "skipping unreachable group member");
                                continue;
                            }
                        };
                        self.expand_transitive(
                            &mut entities,
                            &mut visited,
                            neighbor,
                            threshold,
                            hops_limit - 1,
                            max_size,
                            opts,
                            false,
                        )
                        .await?;
                    }
                }
            }
        }

        Ok(finalize_group(entity_id, entities))
    }

    /// Append entities directly matching `primary`.
    async fn expand_direct(
        &self,
        entities: &mut Vec<MatchResult>,
        visited: &mut HashSet<String>,
        primary: &EntityRecord,
        threshold: f32,
        max_size: usize,
        opts: &MatchGroupOptions,
    ) -> Result<()> {
        let match_opts = self.group_match_options(threshold, max_size, opts);
        let matches = self
            .find_matches_for_entity(&EntityData::from(primary), &match_opts)
            .await?;

        for matched in matches {
            if visited.contains(&matched.id) {
                continue;
            }
            visited.insert(matched.id.clone());
            entities.push(matched);
            if entities.len() >= max_size {
                break;
            }
        }
        Ok(())
    }

    /// BFS over the match graph from `start`, stamping hop distances.
    ///
    /// `fail_on_start` propagates match errors for the start node (the
    /// primary); deeper expansion errors are logged and skipped.
    #[allow(clippy::too_many_arguments)]
    async fn expand_transitive(
        &self,
        entities: &mut Vec<MatchResult>,
        visited: &mut HashSet<String>,
        start: EntityRecord,
        threshold: f32,
        hops_limit: usize,
        max_size: usize,
        opts: &MatchGroupOptions,
        fail_on_start: bool,
    ) -> Result<()> {
        let match_opts = self.group_match_options(threshold, max_size, opts);
        let start_id = start.id.clone();

        let mut queue: VecDeque<(EntityRecord, usize)> = VecDeque::new();
        queue.push_back((start, 0));

        while let Some((current, hops)) = queue.pop_front() {
            if hops >= hops_limit {
                continue;
            }

            let matches = match self
                .find_matches_for_entity(&EntityData::from(&current), &match_opts)
                .await
            {
                Ok(matches) => matches,
                Err(e) if fail_on_start && current.id == start_id => return Err(e),
                Err(e) => {
                    warn!(id = %current.id, error = %e, "skipping failed group expansion");
                    continue;
                }
            };

            for mut matched in matches {
                if visited.contains(&matched.id) {
                    continue;
                }
                visited.insert(matched.id.clone());

                matched
                    .metadata
                    .insert(HOP_DISTANCE_KEY.to_string(), Value::from(hops as u64 + 1));
                let matched_id = matched.id.clone();
                entities.push(matched);

                if entities.len() >= max_size {
                    return Ok(());
                }

                // Fetch the full record to keep expanding from this node.
                match self.store().get(&matched_id).await {
                    Ok(record) => queue.push_back((record, hops + 1)),
                    Err(e) => {
                        warn!(id = %matched_id, error = %e, "couldn't retrieve entity for expansion");
                    }
                }
            }
        }

        Ok(())
    }

    fn group_match_options(
        &self,
        threshold: f32,
        max_size: usize,
        opts: &MatchGroupOptions,
    ) -> MatchOptions {
        MatchOptions {
            limit: max_size,
            threshold,
            include_details: opts.include_scores,
            use_clustering: self.config().clustering.enabled,
            include_field_scores: opts.include_scores,
            field_weights: opts.field_weights.clone(),
            ..MatchOptions::default()
        }
    }
}

/// Sort, aggregate and annotate the collected members.
fn finalize_group(primary_id: &str, mut entities: Vec<MatchResult>) -> MatchGroup {
    // Primary stays first regardless of score ties.
    entities.sort_by(|a, b| {
        (b.id == primary_id)
            .cmp(&(a.id == primary_id))
            .then_with(|| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    });

    let size = entities.len();
    let score = if size == 0 {
        0.0
    } else {
        entities.iter().map(|e| e.score).sum::<f32>() / size as f32
    };

    // Tally raw field values; the modal value per field becomes the sample.
    let mut field_counts: HashMap<&str, HashMap<&str, usize>> = HashMap::new();
    for entity in &entities {
        for (field, value) in &entity.fields {
            if field.ends_with("_normalized") || value.is_empty() {
                continue;
            }
            *field_counts
                .entry(field)
                .or_default()
                .entry(value)
                .or_default() += 1;
        }
    }

    let mut sample_fields = HashMap::new();
    for (field, value_counts) in field_counts {
        let Some((modal_value, modal_count)) = value_counts
            .into_iter()
            // Highest count wins; ties break lexicographically for
            // deterministic output.
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        else {
            continue;
        };

        let agreement = modal_count as f32 / size as f32;
        sample_fields.insert(
            field.to_string(),
            SampleField {
                value: modal_value.to_string(),
                agreement,
                confidence: agreement * score,
            },
        );
    }

    MatchGroup {
        id: primary_id.to_string(),
        primary_id: primary_id.to_string(),
        entities,
        score,
        size,
        sample_fields,
    }
}
