use std::collections::{HashMap, HashSet};

use graphrag_primitives::{
    llm::utils::num_tokens,
    models::{CommunityHierarchy, CommunityNode},
    tables::{CovariateRow, EntityRow, RelationshipRow},
};

use super::extractor::CommunityReportContent;
use crate::graph::KnowledgeGraph;

/// Tables a community context is drawn from.
pub struct ReportInputs<'a> {
    pub graph: &'a KnowledgeGraph,
    pub entities: &'a [EntityRow],
    pub relationships: &'a [RelationshipRow],
    pub claims: &'a [CovariateRow],
    entity_index: HashMap<&'a str, &'a EntityRow>,
}

impl<'a> ReportInputs<'a> {
    pub fn new(
        graph: &'a KnowledgeGraph,
        entities: &'a [EntityRow],
        relationships: &'a [RelationshipRow],
        claims: &'a [CovariateRow],
    ) -> Self {
        ReportInputs {
            graph,
            entities,
            relationships,
            claims,
            entity_index: entities.iter().map(|e| (e.name.as_str(), e)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommunityContext {
    pub text: String,
    /// Some rows did not fit in the token budget.
    pub exceeds_limit: bool,
}

/// Greedily appends rows under a token budget.
struct SectionWriter {
    text: String,
    tokens: usize,
    max_tokens: usize,
    exceeds_limit: bool,
}

impl SectionWriter {
    fn new(max_tokens: usize) -> Self {
        SectionWriter {
            text: String::new(),
            tokens: 0,
            max_tokens,
            exceeds_limit: false,
        }
    }

    fn section(&mut self, header: &str, rows: Vec<String>) {
        if rows.is_empty() {
            return;
        }

        let header_tokens = num_tokens(header);
        if self.tokens + header_tokens > self.max_tokens {
            self.exceeds_limit = true;
            return;
        }
        self.text.push_str(header);
        self.tokens += header_tokens;

        for row in rows {
            let row_tokens = num_tokens(&row);
            if self.tokens + row_tokens > self.max_tokens {
                self.exceeds_limit = true;
                break;
            }
            self.text.push_str(&row);
            self.tokens += row_tokens;
        }
        self.text.push('\n');
        self.tokens += 1;
    }

    fn finish(self) -> CommunityContext {
        CommunityContext {
            text: self.text.trim_end().to_string(),
            exceeds_limit: self.exceeds_limit,
        }
    }
}

fn clean(value: &str) -> String {
    value.replace(['\n', '\r'], " ")
}

/// Context for a set of community members: entities by degree, internal
/// relationships by combined degree, then claims about the members.
pub fn build_community_context(inputs: &ReportInputs, members: &[String], max_tokens: usize) -> CommunityContext {
    let member_set: HashSet<&str> = members.iter().map(|m| m.as_str()).collect();
    let mut writer = SectionWriter::new(max_tokens);

    let mut entities: Vec<(&str, usize)> = members.iter().map(|m| (m.as_str(), inputs.graph.degree(m))).collect();
    entities.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let entity_rows = entities
        .iter()
        .enumerate()
        .map(|(index, (name, degree))| {
            let entity = inputs.entity_index.get(name);
            let id = entity
                .and_then(|e| e.human_readable_id.clone())
                .unwrap_or_else(|| index.to_string());
            let description = entity
                .and_then(|e| e.description.clone())
                .or_else(|| inputs.graph.node(name).and_then(|n| n.description.clone()))
                .unwrap_or_default();
            format!("{},{},{},{}\n", id, name, clean(&description), degree)
        })
        .collect();
    writer.section("-----Entities-----\nid,entity,description,degree\n", entity_rows);

    let mut relationships: Vec<(&RelationshipRow, usize)> = inputs
        .relationships
        .iter()
        .filter(|r| member_set.contains(r.source.as_str()) && member_set.contains(r.target.as_str()))
        .map(|r| (r, inputs.graph.degree(&r.source) + inputs.graph.degree(&r.target)))
        .collect();
    relationships.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
    let relationship_rows = relationships
        .iter()
        .map(|(r, combined_degree)| {
            format!(
                "{},{},{},{},{}\n",
                r.human_readable_id.as_deref().unwrap_or(&r.id),
                r.source,
                r.target,
                clean(r.description.as_deref().unwrap_or_default()),
                combined_degree
            )
        })
        .collect();
    writer.section(
        "-----Relationships-----\nid,source,target,description,combined_degree\n",
        relationship_rows,
    );

    let claim_rows = inputs
        .claims
        .iter()
        .filter(|c| c.subject_id.as_deref().is_some_and(|s| member_set.contains(s)))
        .map(|c| {
            format!(
                "{},{},{},{},{}\n",
                c.id,
                c.subject_id.as_deref().unwrap_or_default(),
                c.covariate_type.as_deref().unwrap_or_default(),
                c.status.as_deref().unwrap_or_default(),
                clean(c.description.as_deref().unwrap_or_default())
            )
        })
        .collect();
    writer.section("-----Claims-----\nid,subject,type,status,description\n", claim_rows);

    writer.finish()
}

/// Context for `community`. When its own members overflow the budget, the
/// reports of its largest already summarised sub-communities stand in for
/// their members and the remaining members fill what is left.
pub fn build_hierarchical_context(
    inputs: &ReportInputs,
    hierarchy: &CommunityHierarchy,
    community: &CommunityNode,
    sub_reports: &HashMap<u32, CommunityReportContent>,
    max_tokens: usize,
) -> CommunityContext {
    let local = build_community_context(inputs, &community.members, max_tokens);
    if !local.exceeds_limit {
        return local;
    }

    let mut children: Vec<(&CommunityNode, &CommunityReportContent)> = community
        .children
        .iter()
        .filter_map(|id| Some((hierarchy.community(*id)?, sub_reports.get(id)?)))
        .collect();
    children.sort_by(|a, b| b.0.members.len().cmp(&a.0.members.len()).then_with(|| a.0.id.cmp(&b.0.id)));

    let mut writer = SectionWriter::new(max_tokens);
    let mut covered: HashSet<&str> = HashSet::new();
    let mut rows = Vec::new();
    let mut row_tokens = num_tokens("-----Reports-----\nid,title,summary\n");
    for (child, report) in children {
        let row = format!("{},{},{}\n", child.id, clean(&report.title), clean(&report.summary));
        let tokens = num_tokens(&row);
        if row_tokens + tokens > max_tokens {
            break;
        }
        row_tokens += tokens;
        rows.push(row);
        covered.extend(child.members.iter().map(|m| m.as_str()));
    }

    if rows.is_empty() {
        return local;
    }
    writer.section("-----Reports-----\nid,title,summary\n", rows);

    let remaining: Vec<String> = community
        .members
        .iter()
        .filter(|m| !covered.contains(m.as_str()))
        .cloned()
        .collect();
    let rest = build_community_context(inputs, &remaining, max_tokens.saturating_sub(writer.tokens));

    let mut context = writer.finish();
    if !rest.text.is_empty() {
        context.text = format!("{}\n\n{}", context.text, rest.text);
    }
    context.exceeds_limit = rest.exceeds_limit;
    context
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, description: &str) -> EntityRow {
        EntityRow {
            id: format!("id-{}", name),
            human_readable_id: Some(name.to_lowercase()),
            name: name.to_string(),
            entity_type: None,
            description: Some(description.to_string()),
            description_embedding: None,
            text_unit_ids: Vec::new(),
        }
    }

    fn relationship(id: &str, source: &str, target: &str) -> RelationshipRow {
        RelationshipRow {
            id: id.to_string(),
            human_readable_id: None,
            source: source.to_string(),
            target: target.to_string(),
            description: Some(format!("{} knows {}", source, target)),
            weight: Some(1.0),
            text_unit_ids: String::new(),
        }
    }

    fn fixture() -> (KnowledgeGraph, Vec<EntityRow>, Vec<RelationshipRow>, Vec<CovariateRow>) {
        let entities = vec![entity("A", "first"), entity("B", "second"), entity("C", "third")];
        let relationships = vec![relationship("r1", "A", "B"), relationship("r2", "B", "C")];
        let mut claim = CovariateRow {
            id: "c1".to_string(),
            subject_id: Some("B".to_string()),
            object_id: None,
            covariate_type: Some("FRAUD".to_string()),
            status: Some("TRUE".to_string()),
            start_date: None,
            end_date: None,
            description: Some("B was investigated".to_string()),
            text_unit_ids: Vec::new(),
        };
        let other_claim = CovariateRow {
            id: "c2".to_string(),
            subject_id: Some("Z".to_string()),
            ..claim.clone()
        };
        claim.text_unit_ids.push("t1".to_string());
        let graph = KnowledgeGraph::from_tables(&entities, &relationships);
        (graph, entities, relationships, vec![claim, other_claim])
    }

    fn members(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_context_sections_are_ordered_by_degree() {
        let (graph, entities, relationships, claims) = fixture();
        let inputs = ReportInputs::new(&graph, &entities, &relationships, &claims);

        let context = build_community_context(&inputs, &members(&["A", "B", "C"]), 8000);
        assert!(!context.exceeds_limit);
        assert_eq!(
            context.text,
            "-----Entities-----\nid,entity,description,degree\nb,B,second,2\na,A,first,1\nc,C,third,1\n\n\
             -----Relationships-----\nid,source,target,description,combined_degree\nr1,A,B,A knows B,3\nr2,B,C,B knows C,3\n\n\
             -----Claims-----\nid,subject,type,status,description\nc1,B,FRAUD,TRUE,B was investigated"
        );
    }

    #[test]
    fn test_relationships_outside_members_are_excluded() {
        let (graph, entities, relationships, claims) = fixture();
        let inputs = ReportInputs::new(&graph, &entities, &relationships, &claims);

        let context = build_community_context(&inputs, &members(&["A", "B"]), 8000);
        assert!(context.text.contains("r1,A,B"));
        assert!(!context.text.contains("r2"));
    }

    #[test]
    fn test_budget_truncates_rows() {
        let (graph, entities, relationships, claims) = fixture();
        let inputs = ReportInputs::new(&graph, &entities, &relationships, &claims);

        let context = build_community_context(&inputs, &members(&["A", "B", "C"]), 20);
        assert!(context.exceeds_limit);
        assert!(num_tokens(&context.text) <= 20);
    }

    #[test]
    fn test_sub_reports_replace_members_on_overflow() {
        let (graph, entities, relationships, claims) = fixture();
        let inputs = ReportInputs::new(&graph, &entities, &relationships, &claims);

        let mut hierarchy = CommunityHierarchy::new();
        let root = hierarchy.push(0, None, members(&["A", "B", "C"]));
        let child = hierarchy.push(1, Some(root), members(&["A", "B"]));
        hierarchy.push(1, Some(root), members(&["C"]));

        let sub_reports = HashMap::from([(
            child,
            CommunityReportContent {
                title: "AB".to_string(),
                summary: "A and B".to_string(),
                rating: 1.0,
                rating_explanation: String::new(),
                findings: Vec::new(),
            },
        )]);

        let community = hierarchy.community(root).unwrap().clone();
        let full = build_community_context(&inputs, &community.members, 8000);
        let budget = num_tokens(&full.text) - 1;

        let context = build_hierarchical_context(&inputs, &hierarchy, &community, &sub_reports, budget);
        assert!(context.text.starts_with("-----Reports-----\nid,title,summary\n1,AB,A and B"));
        assert!(context.text.contains("c,C,third"));
        assert!(!context.text.contains("a,A,first"));
    }
}
