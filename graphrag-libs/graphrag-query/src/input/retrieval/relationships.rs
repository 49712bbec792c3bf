use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use graphrag_primitives::models::{Entity, Relationship};
use polars::frame::DataFrame;

use super::{attribute_columns, records_to_dataframe};

/// How a relationship's combined rank is derived from its endpoint ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankAggregation {
    #[default]
    Sum,
    Max,
    Min,
}

impl RankAggregation {
    pub fn combine(&self, source_rank: i32, target_rank: i32) -> i32 {
        match self {
            RankAggregation::Sum => source_rank + target_rank,
            RankAggregation::Max => source_rank.max(target_rank),
            RankAggregation::Min => source_rank.min(target_rank),
        }
    }
}

/// Attribute relationships are prioritised by.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RelationshipRanking {
    /// Combined rank of the endpoint entities.
    #[default]
    Rank,
    Weight,
    Attribute(String),
}

impl RelationshipRanking {
    pub fn value(&self, relationship: &Relationship) -> f64 {
        match self {
            RelationshipRanking::Rank => relationship.rank.unwrap_or(0) as f64,
            RelationshipRanking::Weight => relationship.weight.unwrap_or(0.0),
            RelationshipRanking::Attribute(name) => relationship
                .attributes
                .as_ref()
                .and_then(|attrs| attrs.get(name))
                .and_then(|value| value.parse::<f64>().ok())
                .unwrap_or(0.0),
        }
    }
}

pub fn get_in_network_relationships(
    selected_entities: &[Entity],
    relationships: &[Relationship],
    ranking_attribute: &RelationshipRanking,
) -> Vec<Relationship> {
    let selected_entity_names: HashSet<&str> = selected_entities.iter().map(|entity| entity.title.as_str()).collect();

    let selected_relationships: Vec<Relationship> = relationships
        .iter()
        .filter(|relationship| {
            selected_entity_names.contains(relationship.source.as_str())
                && selected_entity_names.contains(relationship.target.as_str())
        })
        .cloned()
        .collect();

    if selected_relationships.len() <= 1 {
        return selected_relationships;
    }

    sort_relationships_by_ranking_attribute(selected_relationships, selected_entities, ranking_attribute)
}

pub fn get_out_network_relationships(
    selected_entities: &[Entity],
    relationships: &[Relationship],
    ranking_attribute: &RelationshipRanking,
) -> Vec<Relationship> {
    let selected_entity_names: HashSet<&str> = selected_entities.iter().map(|e| e.title.as_str()).collect();

    let source_relationships = relationships
        .iter()
        .filter(|r| selected_entity_names.contains(r.source.as_str()) && !selected_entity_names.contains(r.target.as_str()));

    let target_relationships = relationships
        .iter()
        .filter(|r| selected_entity_names.contains(r.target.as_str()) && !selected_entity_names.contains(r.source.as_str()));

    let selected_relationships: Vec<Relationship> = source_relationships.chain(target_relationships).cloned().collect();

    sort_relationships_by_ranking_attribute(selected_relationships, selected_entities, ranking_attribute)
}

pub fn get_candidate_relationships(selected_entities: &[Entity], relationships: &[Relationship]) -> Vec<Relationship> {
    let selected_entity_names: HashSet<&str> = selected_entities.iter().map(|e| e.title.as_str()).collect();

    relationships
        .iter()
        .filter(|r| selected_entity_names.contains(r.source.as_str()) || selected_entity_names.contains(r.target.as_str()))
        .cloned()
        .collect()
}

pub fn get_entities_from_relationships(relationships: &[Relationship], entities: &[Entity]) -> Vec<Entity> {
    let selected_entity_names: HashSet<&str> = relationships
        .iter()
        .flat_map(|r| [r.source.as_str(), r.target.as_str()])
        .collect();

    entities
        .iter()
        .filter(|entity| selected_entity_names.contains(entity.title.as_str()))
        .cloned()
        .collect()
}

/// Stable descending sort by the ranking attribute. Relationships without a
/// combined rank get one computed from `entities` first.
pub fn sort_relationships_by_ranking_attribute(
    relationships: Vec<Relationship>,
    entities: &[Entity],
    ranking_attribute: &RelationshipRanking,
) -> Vec<Relationship> {
    if relationships.is_empty() {
        return relationships;
    }

    let mut relationships = relationships;

    if *ranking_attribute == RelationshipRanking::Rank && relationships.iter().any(|r| r.rank.is_none()) {
        calculate_relationship_combined_rank(&mut relationships, entities, RankAggregation::Sum);
    }

    relationships.sort_by(|a, b| {
        ranking_attribute
            .value(b)
            .partial_cmp(&ranking_attribute.value(a))
            .unwrap_or(Ordering::Equal)
    });

    relationships
}

/// Sets each relationship's combined rank from its endpoint entity ranks.
/// Unknown endpoints count as rank 0.
pub fn calculate_relationship_combined_rank(
    relationships: &mut [Relationship],
    entities: &[Entity],
    aggregation: RankAggregation,
) {
    let entity_ranks: HashMap<&str, i32> = entities
        .iter()
        .map(|e| (e.title.as_str(), e.rank.unwrap_or(0)))
        .collect();

    for relationship in relationships.iter_mut() {
        let source_rank = entity_ranks.get(relationship.source.as_str()).copied().unwrap_or(0);
        let target_rank = entity_ranks.get(relationship.target.as_str()).copied().unwrap_or(0);
        relationship.rank = Some(aggregation.combine(source_rank, target_rank));
    }
}

pub fn to_relationship_dataframe(
    relationships: &[Relationship],
    include_relationship_weight: bool,
) -> anyhow::Result<DataFrame> {
    if relationships.is_empty() {
        return Ok(DataFrame::default());
    }

    let mut header = vec![
        "id".to_string(),
        "source".to_string(),
        "target".to_string(),
        "description".to_string(),
    ];
    if include_relationship_weight {
        header.push("weight".to_string());
    }
    let include_rank = relationships.iter().any(|r| r.rank.is_some());
    if include_rank {
        header.push("rank".to_string());
    }

    let attribute_cols = attribute_columns(relationships[0].attributes.as_ref(), &header);
    header.extend(attribute_cols.iter().cloned());

    let records: Vec<Vec<String>> = relationships
        .iter()
        .map(|rel| {
            let mut record = vec![
                rel.short_id.clone().unwrap_or_default(),
                rel.source.clone(),
                rel.target.clone(),
                rel.description.clone().unwrap_or_default(),
            ];
            if include_relationship_weight {
                record.push(rel.weight.map(|w| w.to_string()).unwrap_or_default());
            }
            if include_rank {
                record.push(rel.rank.map(|r| r.to_string()).unwrap_or_default());
            }
            for field in &attribute_cols {
                record.push(
                    rel.attributes
                        .as_ref()
                        .and_then(|attrs| attrs.get(field))
                        .cloned()
                        .unwrap_or_default(),
                );
            }
            record
        })
        .collect();

    records_to_dataframe(&header, &records, &["weight", "rank"])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(title: &str, rank: i32) -> Entity {
        let mut entity = Entity::new(title, title);
        entity.rank = Some(rank);
        entity
    }

    fn relationship(source: &str, target: &str, weight: f64) -> Relationship {
        let mut relationship = Relationship::new(&format!("{}-{}", source, target), source, target);
        relationship.weight = Some(weight);
        relationship
    }

    #[test]
    fn test_combined_rank_is_sum_of_endpoint_ranks() {
        let entities = vec![entity("A", 5), entity("B", 3)];
        let mut relationships = vec![relationship("A", "B", 1.0), relationship("A", "C", 1.0)];

        calculate_relationship_combined_rank(&mut relationships, &entities, RankAggregation::Sum);
        assert_eq!(relationships[0].rank, Some(8));
        assert_eq!(relationships[1].rank, Some(5));

        calculate_relationship_combined_rank(&mut relationships, &entities, RankAggregation::Max);
        assert_eq!(relationships[0].rank, Some(5));
    }

    #[test]
    fn test_in_and_out_network_relationships() {
        let entities = vec![entity("A", 5), entity("B", 3), entity("C", 9), entity("D", 1)];
        let relationships = vec![
            relationship("A", "B", 1.0),
            relationship("A", "D", 1.0),
            relationship("C", "B", 1.0),
            relationship("C", "D", 1.0),
        ];
        let selected = &entities[..2];

        let in_network = get_in_network_relationships(selected, &relationships, &RelationshipRanking::Rank);
        assert_eq!(in_network.len(), 1);
        assert_eq!(in_network[0].id, "A-B");

        let out_network = get_out_network_relationships(selected, &relationships, &RelationshipRanking::Rank);
        let ids: Vec<&str> = out_network.iter().map(|r| r.id.as_str()).collect();
        // C-B has combined rank 3 (C is unknown to the selection), A-D has 5.
        assert_eq!(ids, vec!["A-D", "C-B"]);
    }

    #[test]
    fn test_sort_by_weight() {
        let relationships = vec![relationship("A", "B", 1.0), relationship("B", "C", 3.0)];
        let sorted = sort_relationships_by_ranking_attribute(relationships, &[], &RelationshipRanking::Weight);
        assert_eq!(sorted[0].id, "B-C");
    }
}
