//! Read-through adapters from the persisted index tables to the knowledge
//! model used by the search engines. All functions are pure: identical input
//! tables give identical, identically ordered output.

use std::collections::{BTreeMap, HashMap, HashSet};

use graphrag_primitives::{
    models::{CommunityReport, Covariate, Entity, Relationship, TextUnit},
    tables::{split_id_list, CommunityReportRow, CovariateRow, EntityRow, NodeRow, RelationshipRow, TextUnitRow},
    utils::logging::{graphrag_log, GraphRagLogLevel, GraphRagLogOption},
};

use crate::input::retrieval::relationships::{calculate_relationship_combined_rank, RankAggregation};

const NO_COMMUNITY: i64 = -1;
const MISSING_RANK: f64 = -1.0;

/// Joins the node table (filtered to `community_level`) with the entity table.
/// Per (name, rank) the highest community id is kept; output is ordered by
/// (name, rank) and holds one entity per name.
pub fn read_indexer_entities(final_nodes: &[NodeRow], final_entities: &[EntityRow], community_level: u32) -> Vec<Entity> {
    let mut communities: BTreeMap<(&str, i32), i64> = BTreeMap::new();
    for node in filter_under_community_level(final_nodes, community_level) {
        let community = node.community.unwrap_or(NO_COMMUNITY);
        communities
            .entry((node.title.as_str(), node.degree))
            .and_modify(|current| *current = (*current).max(community))
            .or_insert(community);
    }

    let mut entity_rows: HashMap<&str, Vec<(usize, &EntityRow)>> = HashMap::new();
    for (idx, row) in final_entities.iter().enumerate() {
        entity_rows.entry(row.name.as_str()).or_default().push((idx, row));
    }

    let mut seen_names: HashSet<&str> = HashSet::new();
    let mut entities = Vec::new();
    for ((name, rank), community) in communities {
        let Some(rows) = entity_rows.get(name) else {
            continue;
        };

        for (idx, row) in rows {
            if !seen_names.insert(name) {
                break;
            }

            entities.push(Entity {
                id: row.id.clone(),
                short_id: Some(row.human_readable_id.clone().unwrap_or_else(|| idx.to_string())),
                title: name.to_string(),
                entity_type: row.entity_type.clone(),
                description: row.description.clone(),
                description_embedding: row.description_embedding.clone(),
                name_embedding: None,
                graph_embedding: None,
                community_ids: Some(vec![community.to_string()]),
                text_unit_ids: Some(row.text_unit_ids.clone()),
                document_ids: None,
                rank: Some(rank),
                attributes: None,
            });
        }
    }

    graphrag_log(
        GraphRagLogOption::Adapters,
        GraphRagLogLevel::Debug,
        &format!("Read {} entities at community level {}", entities.len(), community_level),
    );

    entities
}

/// Keeps reports at or under `community_level` whose community is the finest
/// community of some node at that level. Report table order is preserved and a
/// missing rank becomes -1.
pub fn read_indexer_reports(
    final_community_reports: &[CommunityReportRow],
    final_nodes: &[NodeRow],
    community_level: u32,
) -> Vec<CommunityReport> {
    let mut node_communities: HashMap<&str, i64> = HashMap::new();
    for node in filter_under_community_level(final_nodes, community_level) {
        let community = node.community.unwrap_or(NO_COMMUNITY);
        node_communities
            .entry(node.title.as_str())
            .and_modify(|current| *current = (*current).max(community))
            .or_insert(community);
    }
    let retained: HashSet<String> = node_communities.values().map(|c| c.to_string()).collect();

    let mut seen_ids: HashSet<&str> = HashSet::new();
    let reports: Vec<CommunityReport> = final_community_reports
        .iter()
        .filter(|row| row.level <= community_level)
        .filter(|row| retained.contains(row.community_id.as_str()))
        .filter(|&row| seen_ids.insert(row.community_id.as_str()))
        .map(|row| CommunityReport {
            id: row.community_id.clone(),
            short_id: Some(row.community_id.clone()),
            title: row.title.clone(),
            community_id: row.community_id.clone(),
            summary: row.summary.clone(),
            full_content: row.full_content.clone(),
            rank: Some(row.rank.unwrap_or(MISSING_RANK)),
            level: Some(row.level),
            summary_embedding: None,
            full_content_embedding: None,
            attributes: None,
        })
        .collect();

    graphrag_log(
        GraphRagLogOption::Adapters,
        GraphRagLogLevel::Debug,
        &format!("Read {} community reports at level {}", reports.len(), community_level),
    );

    reports
}

/// Converts relationship rows and sets each combined rank from the ranks of
/// its endpoint entities. Relationships whose endpoints aren't both known
/// entities are dropped.
pub fn read_indexer_relationships(
    final_relationships: &[RelationshipRow],
    entities: &[Entity],
    aggregation: RankAggregation,
) -> Vec<Relationship> {
    let known_titles: HashSet<&str> = entities.iter().map(|e| e.title.as_str()).collect();

    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut relationships: Vec<Relationship> = final_relationships
        .iter()
        .enumerate()
        .filter(|&(_, row)| seen_ids.insert(row.id.as_str()))
        .filter(|(_, row)| known_titles.contains(row.source.as_str()) && known_titles.contains(row.target.as_str()))
        .map(|(idx, row)| Relationship {
            id: row.id.clone(),
            short_id: Some(row.human_readable_id.clone().unwrap_or_else(|| idx.to_string())),
            source: row.source.clone(),
            target: row.target.clone(),
            description: row.description.clone(),
            description_embedding: None,
            weight: row.weight,
            rank: None,
            text_unit_ids: Some(split_id_list(&row.text_unit_ids)),
            document_ids: None,
            attributes: None,
        })
        .collect();

    let dropped = seen_ids.len() - relationships.len();
    if dropped > 0 {
        graphrag_log(
            GraphRagLogOption::Adapters,
            GraphRagLogLevel::Info,
            &format!("Dropped {} relationships with unknown endpoints", dropped),
        );
    }

    calculate_relationship_combined_rank(&mut relationships, entities, aggregation);
    relationships
}

pub fn read_indexer_text_units(final_text_units: &[TextUnitRow]) -> Vec<TextUnit> {
    let mut seen_ids: HashSet<&str> = HashSet::new();

    final_text_units
        .iter()
        .enumerate()
        .filter(|&(_, row)| seen_ids.insert(row.id.as_str()))
        .map(|(idx, row)| TextUnit {
            id: row.id.clone(),
            short_id: Some(idx.to_string()),
            text: row.text.clone(),
            entity_ids: Some(row.entity_ids.clone()),
            relationship_ids: Some(row.relationship_ids.clone()),
            covariate_ids: if row.covariate_ids.is_empty() {
                None
            } else {
                Some(HashMap::from([("claims".to_string(), row.covariate_ids.clone())]))
            },
            n_tokens: row.n_tokens,
            document_ids: Some(row.document_ids.clone()),
            attributes: None,
        })
        .collect()
}

pub fn read_indexer_covariates(final_covariates: &[CovariateRow]) -> Vec<Covariate> {
    let mut seen_ids: HashSet<&str> = HashSet::new();

    final_covariates
        .iter()
        .enumerate()
        .filter(|&(_, row)| seen_ids.insert(row.id.as_str()))
        .map(|(idx, row)| {
            let attributes: HashMap<String, String> = [
                ("object_id", &row.object_id),
                ("status", &row.status),
                ("start_date", &row.start_date),
                ("end_date", &row.end_date),
                ("description", &row.description),
            ]
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.clone().unwrap_or_default()))
            .collect();

            Covariate {
                id: row.id.clone(),
                short_id: Some(idx.to_string()),
                subject_id: row.subject_id.clone().unwrap_or_default(),
                subject_type: Some("entity".to_string()),
                covariate_type: Some(row.covariate_type.clone().unwrap_or_else(|| "claim".to_string())),
                text_unit_ids: Some(row.text_unit_ids.clone()),
                document_ids: None,
                attributes: Some(attributes),
            }
        })
        .collect()
}

fn filter_under_community_level(nodes: &[NodeRow], community_level: u32) -> impl Iterator<Item = &NodeRow> {
    nodes.iter().filter(move |node| node.level <= community_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(title: &str, level: u32, degree: i32, community: Option<i64>) -> NodeRow {
        NodeRow {
            title: title.to_string(),
            node_type: Some("entity".to_string()),
            level,
            degree,
            community,
        }
    }

    fn entity_row(name: &str) -> EntityRow {
        EntityRow {
            id: format!("id-{}", name),
            human_readable_id: None,
            name: name.to_string(),
            entity_type: None,
            description: Some(format!("about {}", name)),
            description_embedding: None,
            text_unit_ids: vec![format!("t-{}", name)],
        }
    }

    fn report(community_id: &str, level: u32, rank: Option<f64>) -> CommunityReportRow {
        CommunityReportRow {
            community_id: community_id.to_string(),
            title: format!("Community {}", community_id),
            summary: String::new(),
            full_content: String::new(),
            rank,
            rank_explanation: None,
            level,
        }
    }

    fn nodes() -> Vec<NodeRow> {
        vec![
            node("B", 0, 2, Some(0)),
            node("B", 1, 2, Some(3)),
            node("A", 0, 5, Some(0)),
            node("A", 1, 5, Some(2)),
            node("A", 2, 5, Some(7)),
            node("C", 0, 1, None),
        ]
    }

    #[test]
    fn test_read_indexer_entities_keeps_finest_community_under_level() {
        let entities = read_indexer_entities(&nodes(), &[entity_row("C"), entity_row("A"), entity_row("B")], 1);

        let titles: Vec<&str> = entities.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        assert_eq!(entities[0].community_ids, Some(vec!["2".to_string()]));
        assert_eq!(entities[0].rank, Some(5));
        assert_eq!(entities[1].community_ids, Some(vec!["3".to_string()]));
        assert_eq!(entities[2].community_ids, Some(vec!["-1".to_string()]));
        assert_eq!(entities[0].short_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_read_indexer_entities_drops_duplicate_names() {
        let entities = read_indexer_entities(&nodes(), &[entity_row("A"), entity_row("A")], 2);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].community_ids, Some(vec!["7".to_string()]));
    }

    #[test]
    fn test_read_indexer_entities_is_idempotent() {
        let entity_rows = vec![entity_row("B"), entity_row("A"), entity_row("C")];
        let first = read_indexer_entities(&nodes(), &entity_rows, 2);
        let second = read_indexer_entities(&nodes(), &entity_rows, 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_read_indexer_reports_filters_level_and_community() {
        let reports = vec![
            report("7", 2, Some(9.0)),
            report("3", 1, None),
            report("0", 0, Some(4.0)),
            report("2", 1, Some(5.0)),
        ];

        let result = read_indexer_reports(&reports, &nodes(), 1);
        let ids: Vec<&str> = result.iter().map(|r| r.community_id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
        assert_eq!(result[0].rank, Some(-1.0));
        assert_eq!(result[1].level, Some(1));
    }

    #[test]
    fn test_read_indexer_relationships_combines_ranks() {
        let entities = read_indexer_entities(&nodes(), &[entity_row("A"), entity_row("B")], 0);
        let rows = vec![
            RelationshipRow {
                id: "r1".to_string(),
                human_readable_id: Some("10".to_string()),
                source: "A".to_string(),
                target: "B".to_string(),
                description: None,
                weight: Some(1.0),
                text_unit_ids: "t1, t2".to_string(),
            },
            RelationshipRow {
                id: "r2".to_string(),
                human_readable_id: None,
                source: "A".to_string(),
                target: "Z".to_string(),
                description: None,
                weight: None,
                text_unit_ids: String::new(),
            },
        ];

        let relationships = read_indexer_relationships(&rows, &entities, RankAggregation::Sum);
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].rank, Some(7));
        assert_eq!(relationships[0].short_id.as_deref(), Some("10"));
        assert_eq!(
            relationships[0].text_unit_ids,
            Some(vec!["t1".to_string(), "t2".to_string()])
        );
    }

    #[test]
    fn test_read_indexer_covariates_sets_claim_attributes() {
        let rows = vec![CovariateRow {
            id: "c1".to_string(),
            subject_id: Some("A".to_string()),
            object_id: Some("B".to_string()),
            covariate_type: None,
            status: Some("TRUE".to_string()),
            start_date: None,
            end_date: None,
            description: Some("A sued B".to_string()),
            text_unit_ids: vec!["t1".to_string()],
        }];

        let covariates = read_indexer_covariates(&rows);
        assert_eq!(covariates[0].subject_id, "A");
        assert_eq!(covariates[0].covariate_type.as_deref(), Some("claim"));
        assert_eq!(covariates[0].attribute("status"), Some("TRUE"));
        assert_eq!(covariates[0].attribute("start_date"), Some(""));
    }
}
