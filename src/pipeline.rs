use std::collections::HashSet;

use graphrag_index::{
    extractors::community_reports::{
        generate_community_reports, CommunityReportsExtractor, IncompleteCommunityReport, ReportInputs,
    },
    flows::create_final_nodes,
    graph::{clustering::cluster_graph, utils::normalize_node_name, KnowledgeGraph},
};
use graphrag_primitives::{
    llm::base::BaseLLM,
    tables::{CommunityReportRow, CovariateRow, EntityRow, NodeRow, RelationshipRow},
    utils::logging::{graphrag_log, GraphRagLogLevel, GraphRagLogOption},
};
use tracing::instrument;

use crate::utils::environment::GraphRagEnvironment;

/// Tables produced by the graph stage of indexing.
#[derive(Debug, Clone, Default)]
pub struct IndexedTables {
    pub entities: Vec<EntityRow>,
    pub nodes: Vec<NodeRow>,
    pub relationships: Vec<RelationshipRow>,
    pub community_reports: Vec<CommunityReportRow>,
    pub covariates: Vec<CovariateRow>,
    pub incomplete_reports: Vec<IncompleteCommunityReport>,
}

/// Normalises names, clusters the graph and summarises every community.
/// Entities sharing a normalised name keep the first row.
#[instrument(skip_all, fields(entities = entities.len(), relationships = relationships.len()))]
pub async fn index_graph(
    entities: Vec<EntityRow>,
    relationships: Vec<RelationshipRow>,
    covariates: Vec<CovariateRow>,
    llm: Box<dyn BaseLLM>,
    environment: &GraphRagEnvironment,
) -> IndexedTables {
    let mut seen_names = HashSet::new();
    let entities: Vec<EntityRow> = entities
        .into_iter()
        .map(|entity| EntityRow {
            name: normalize_node_name(&entity.name),
            ..entity
        })
        .filter(|entity| seen_names.insert(entity.name.clone()))
        .collect();

    let relationships: Vec<RelationshipRow> = relationships
        .into_iter()
        .map(|relationship| RelationshipRow {
            source: normalize_node_name(&relationship.source),
            target: normalize_node_name(&relationship.target),
            ..relationship
        })
        .collect();

    let covariates: Vec<CovariateRow> = covariates
        .into_iter()
        .map(|covariate| CovariateRow {
            subject_id: covariate.subject_id.as_deref().map(normalize_node_name),
            ..covariate
        })
        .collect();

    let graph = KnowledgeGraph::from_tables(&entities, &relationships);
    let hierarchy = cluster_graph(&graph, &environment.cluster_graph);
    let nodes = create_final_nodes(&graph, &hierarchy);

    let extractor = CommunityReportsExtractor::new(llm, environment.community_reports.clone());
    let inputs = ReportInputs::new(&graph, &entities, &relationships, &covariates);
    let output = generate_community_reports(&extractor, &hierarchy, &inputs).await;

    graphrag_log(
        GraphRagLogOption::Reports,
        GraphRagLogLevel::Info,
        &format!(
            "Indexed {} nodes into {} communities",
            graph.node_count(),
            hierarchy.communities.len()
        ),
    );

    IndexedTables {
        entities,
        nodes,
        relationships,
        community_reports: output.reports,
        covariates,
        incomplete_reports: output.incomplete,
    }
}
