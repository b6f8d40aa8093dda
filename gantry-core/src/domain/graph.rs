//! Pipeline dependency graph
//!
//! Pipelines and their upstream pipelines are kept in an arena. A node names
//! its upstream nodes by id, in the declaration order of the dependency
//! materials. Diamond dependencies share one node, so the graph is a DAG and
//! traversal from a node expands it into one entry per path.
//!
//! A node can only reference nodes added before it, which keeps every graph
//! acyclic by construction.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use super::material::MaterialConfig;
use super::modification::MaterialRevisions;
use super::pipeline::PipelineConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Pipeline '{0}' is not configured")]
    UnknownPipeline(String),

    #[error("Cyclic pipeline dependency: {0}")]
    Cycle(String),

    #[error("Node {0} does not exist in the graph")]
    UnknownNode(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct GraphNode {
    pipeline: PipelineConfig,
    /// Fingerprints of `pipeline.materials`, same order
    fingerprints: Vec<String>,
    upstream: Vec<NodeId>,
}

/// Arena of pipeline nodes
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pipeline whose upstream nodes are already in the graph
    pub fn add_node(
        &mut self,
        pipeline: PipelineConfig,
        upstream: &[NodeId],
    ) -> Result<NodeId, GraphError> {
        if let Some(missing) = upstream.iter().find(|id| id.0 >= self.nodes.len()) {
            return Err(GraphError::UnknownNode(missing.0));
        }

        let fingerprints = pipeline
            .materials
            .iter()
            .map(MaterialConfig::fingerprint)
            .collect();

        self.nodes.push(GraphNode {
            pipeline,
            fingerprints,
            upstream: upstream.to_vec(),
        });
        Ok(NodeId(self.nodes.len() - 1))
    }

    /// Builds the graph of `root` and everything upstream of it
    ///
    /// Upstream pipelines are resolved through `lookup` by name. Each
    /// pipeline gets a single node however many paths lead to it. The root
    /// is the last node added.
    pub fn from_configs<F>(root: &str, lookup: F) -> Result<Self, GraphError>
    where
        F: Fn(&str) -> Option<PipelineConfig>,
    {
        let mut builder = GraphBuilder {
            graph: DependencyGraph::new(),
            ids: HashMap::new(),
            visiting: Vec::new(),
            lookup,
        };
        builder.visit(root)?;

        tracing::debug!(
            "Built dependency graph for {} with {} nodes",
            root,
            builder.graph.len()
        );
        Ok(builder.graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<NodeView<'_>> {
        (id.0 < self.nodes.len()).then_some(NodeView { graph: self, id })
    }

    /// The most recently added node
    pub fn root(&self) -> Option<NodeView<'_>> {
        self.nodes.len().checked_sub(1).map(|index| NodeView {
            graph: self,
            id: NodeId(index),
        })
    }

    /// Node of the named pipeline (case-insensitive)
    pub fn find(&self, pipeline_name: &str) -> Option<NodeView<'_>> {
        self.nodes
            .iter()
            .position(|node| node.pipeline.has_name(pipeline_name))
            .map(|index| NodeView {
                graph: self,
                id: NodeId(index),
            })
    }
}

struct GraphBuilder<F> {
    graph: DependencyGraph,
    ids: HashMap<String, NodeId>,
    visiting: Vec<String>,
    lookup: F,
}

impl<F> GraphBuilder<F>
where
    F: Fn(&str) -> Option<PipelineConfig>,
{
    fn visit(&mut self, name: &str) -> Result<NodeId, GraphError> {
        let key = name.to_lowercase();
        if let Some(id) = self.ids.get(&key) {
            return Ok(*id);
        }

        if self.visiting.contains(&key) {
            let mut path = self.visiting.clone();
            path.push(key);
            return Err(GraphError::Cycle(path.join(" -> ")));
        }

        let pipeline =
            (self.lookup)(name).ok_or_else(|| GraphError::UnknownPipeline(name.to_string()))?;
        let upstream_names: Vec<String> = pipeline
            .dependency_materials()
            .map(|dependency| dependency.pipeline_name.clone())
            .collect();

        self.visiting.push(key.clone());
        let mut upstream = Vec::with_capacity(upstream_names.len());
        for upstream_name in &upstream_names {
            upstream.push(self.visit(upstream_name)?);
        }
        self.visiting.pop();

        let id = self.graph.add_node(pipeline, &upstream)?;
        self.ids.insert(key, id);
        Ok(id)
    }
}

// =============================================================================
// Queue Entries
// =============================================================================

/// An upstream pipeline reached from the root along `path`
///
/// `path` starts at the root and ends with `pipeline`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry<'g> {
    pub pipeline: &'g PipelineConfig,
    pub path: Vec<&'g PipelineConfig>,
}

impl QueueEntry<'_> {
    pub fn path_names(&self) -> Vec<&str> {
        self.path.iter().map(|pipeline| pipeline.name.as_str()).collect()
    }

    pub fn contains_pipeline_in_path(&self, pipeline_name: &str) -> bool {
        self.path.iter().any(|pipeline| pipeline.has_name(pipeline_name))
    }
}

// =============================================================================
// Node View
// =============================================================================

/// A node together with the graph it lives in
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'g> {
    graph: &'g DependencyGraph,
    id: NodeId,
}

impl<'g> NodeView<'g> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn pipeline(&self) -> &'g PipelineConfig {
        &self.inner().pipeline
    }

    pub fn upstream(&self) -> impl Iterator<Item = NodeView<'g>> + '_ {
        let graph = self.graph;
        self.inner()
            .upstream
            .iter()
            .map(move |id| NodeView { graph, id: *id })
    }

    /// Breadth-first expansion of everything upstream of this node
    ///
    /// Siblings come in declaration order, depth by depth. A pipeline
    /// reachable along several paths appears once per path.
    pub fn build_queue(&self) -> Vec<QueueEntry<'g>> {
        let nodes = &self.graph.nodes;
        let mut output = Vec::new();
        let mut work: VecDeque<(NodeId, Vec<&'g PipelineConfig>)> = VecDeque::new();
        work.push_back((self.id, Vec::new()));

        while let Some((id, mut path)) = work.pop_front() {
            let node = &nodes[id.0];
            path.push(&node.pipeline);

            for upstream in &node.upstream {
                let upstream_pipeline = &nodes[upstream.0].pipeline;
                let mut entry_path = path.clone();
                entry_path.push(upstream_pipeline);

                output.push(QueueEntry {
                    pipeline: upstream_pipeline,
                    path: entry_path,
                });
                work.push_back((*upstream, path.clone()));
            }
        }

        output
    }

    /// Materials of this pipeline that no upstream pipeline also declares
    ///
    /// Materials are compared by fingerprint, so the same repository checked
    /// out into another folder counts as shared.
    pub fn unshared_material_configs(&self) -> Vec<&'g MaterialConfig> {
        let upstream = self.upstream_fingerprints();
        let node = self.inner();

        node.pipeline
            .materials
            .iter()
            .zip(&node.fingerprints)
            .filter(|(_, fingerprint)| !upstream.contains(fingerprint.as_str()))
            .map(|(material, _)| material)
            .collect()
    }

    /// Fingerprints of this pipeline's materials and of every upstream one
    pub fn all_material_fingerprints(&self) -> HashSet<String> {
        let mut fingerprints: HashSet<String> = self.inner().fingerprints.iter().cloned().collect();
        fingerprints.extend(self.upstream_fingerprints().into_iter().map(str::to_string));
        fingerprints
    }

    /// Whether every shared material's revisions are filtered out upstream
    ///
    /// A revision of one of this node's unshared materials is not considered.
    /// For any other revision, each upstream material with the same
    /// fingerprint must ignore all of its modified files. True for an empty
    /// set of revisions.
    pub fn is_revisions_of_shared_materials_ignored(&self, revisions: &MaterialRevisions) -> bool {
        let unshared: HashSet<String> = self
            .unshared_material_configs()
            .into_iter()
            .map(MaterialConfig::fingerprint)
            .collect();
        let upstream = self.upstream_materials();

        revisions
            .iter()
            .filter(|revision| !unshared.contains(&revision.fingerprint))
            .all(|revision| {
                upstream
                    .iter()
                    .filter(|(_, fingerprint)| *fingerprint == revision.fingerprint)
                    .all(|(material, _)| revision.should_be_ignored_by(material))
            })
    }

    fn inner(&self) -> &'g GraphNode {
        &self.graph.nodes[self.id.0]
    }

    /// Materials of every pipeline in the build queue, with fingerprints
    fn upstream_materials(&self) -> Vec<(&'g MaterialConfig, &'g str)> {
        let nodes = &self.graph.nodes;
        let mut seen = HashSet::new();
        let mut work = VecDeque::from([self.id]);
        let mut materials = Vec::new();

        while let Some(id) = work.pop_front() {
            for upstream in &nodes[id.0].upstream {
                if seen.insert(*upstream) {
                    let node = &nodes[upstream.0];
                    materials.extend(
                        node.pipeline
                            .materials
                            .iter()
                            .zip(node.fingerprints.iter().map(String::as_str)),
                    );
                    work.push_back(*upstream);
                }
            }
        }

        materials
    }

    fn upstream_fingerprints(&self) -> HashSet<&'g str> {
        self.upstream_materials()
            .into_iter()
            .map(|(_, fingerprint)| fingerprint)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filter::Filter;
    use crate::domain::modification::{MaterialRevision, Modification, ModifiedAction};
    use chrono::Utc;

    fn pipeline(name: &str, materials: Vec<MaterialConfig>) -> PipelineConfig {
        PipelineConfig::new(name, materials)
    }

    fn names(entries: &[QueueEntry<'_>]) -> Vec<(String, Vec<String>)> {
        entries
            .iter()
            .map(|entry| {
                (
                    entry.pipeline.name.clone(),
                    entry.path_names().into_iter().map(str::to_string).collect(),
                )
            })
            .collect()
    }

    fn expected(entries: &[(&str, &[&str])]) -> Vec<(String, Vec<String>)> {
        entries
            .iter()
            .map(|(name, path)| {
                (
                    name.to_string(),
                    path.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect()
    }

    /// current -> (up1, up2) -> uppest, wired by dependency materials
    fn diamond(
        current: Vec<MaterialConfig>,
        up1: Vec<MaterialConfig>,
        up2: Vec<MaterialConfig>,
        uppest: Vec<MaterialConfig>,
    ) -> DependencyGraph {
        let configs = [
            pipeline("current", current),
            pipeline("up1", up1),
            pipeline("up2", up2),
            pipeline("uppest", uppest),
        ];
        DependencyGraph::from_configs("current", |name| {
            configs.iter().find(|config| config.has_name(name)).cloned()
        })
        .unwrap()
    }

    fn up1_dependency() -> MaterialConfig {
        MaterialConfig::dependency("up1", "first")
    }

    fn up2_dependency() -> MaterialConfig {
        MaterialConfig::dependency("up2", "first")
    }

    fn uppest_dependency() -> MaterialConfig {
        MaterialConfig::dependency("uppest", "first")
    }

    fn svn() -> MaterialConfig {
        MaterialConfig::svn("url", Some("loser"))
    }

    fn git() -> MaterialConfig {
        MaterialConfig::git_on_branch("url", "branch")
    }

    fn p4() -> MaterialConfig {
        MaterialConfig::p4("localhost:1666", Some("user"), "//depot/... //client/...")
    }

    fn filtered_hg(pattern: &str) -> MaterialConfig {
        MaterialConfig::hg("hg-url").with_filter(Filter::from_patterns([pattern]))
    }

    fn modification_touching(file: &str) -> Modification {
        let mut modification =
            Modification::new(Some("user"), "comment", Some("i@u.com"), Utc::now(), "foo");
        modification.create_modified_file(file, Some(""), ModifiedAction::Added);
        modification
    }

    fn revisions_of(material: &MaterialConfig, file: &str) -> MaterialRevisions {
        MaterialRevisions::from(MaterialRevision::new(
            material,
            vec![modification_touching(file)],
        ))
    }

    #[test]
    fn test_build_queue_lists_every_path() {
        let hg = MaterialConfig::hg("hg-url");
        let graph = diamond(
            vec![hg.clone(), up1_dependency(), up2_dependency()],
            vec![hg.clone(), uppest_dependency()],
            vec![hg.clone(), uppest_dependency()],
            vec![hg],
        );
        let root = graph.root().unwrap();

        assert_eq!(
            names(&root.build_queue()),
            expected(&[
                ("up1", &["current", "up1"]),
                ("up2", &["current", "up2"]),
                ("uppest", &["current", "up1", "uppest"]),
                ("uppest", &["current", "up2", "uppest"]),
            ])
        );
        // Diamond ancestor shares one node
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn test_build_queue_for_higher_depth() {
        let mut graph = DependencyGraph::new();
        let uppest = graph.add_node(pipeline("uppest", vec![]), &[]).unwrap();
        let upper = graph.add_node(pipeline("upper", vec![]), &[uppest]).unwrap();
        let up1 = graph
            .add_node(pipeline("up1", vec![]), &[upper, uppest])
            .unwrap();
        let up2 = graph
            .add_node(pipeline("up2", vec![]), &[upper, uppest])
            .unwrap();
        let current = graph.add_node(pipeline("current", vec![]), &[up1, up2]).unwrap();

        let queue = graph.node(current).unwrap().build_queue();

        assert_eq!(
            names(&queue),
            expected(&[
                ("up1", &["current", "up1"]),
                ("up2", &["current", "up2"]),
                ("upper", &["current", "up1", "upper"]),
                ("uppest", &["current", "up1", "uppest"]),
                ("upper", &["current", "up2", "upper"]),
                ("uppest", &["current", "up2", "uppest"]),
                ("uppest", &["current", "up1", "upper", "uppest"]),
                ("uppest", &["current", "up2", "upper", "uppest"]),
            ])
        );
        assert!(queue[6].contains_pipeline_in_path("UPPER"));
        assert!(!queue[6].contains_pipeline_in_path("up2"));
    }

    #[test]
    fn test_build_queue_is_empty_without_upstream() {
        let mut graph = DependencyGraph::new();
        let id = graph.add_node(pipeline("lonely", vec![]), &[]).unwrap();

        assert!(graph.node(id).unwrap().build_queue().is_empty());
    }

    #[test]
    fn test_add_node_rejects_unknown_upstream() {
        let mut graph = DependencyGraph::new();
        let result = graph.add_node(pipeline("current", vec![]), &[NodeId(3)]);

        assert_eq!(result, Err(GraphError::UnknownNode(3)));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_unshared_materials_ignore_destination_folders() {
        let common1 = MaterialConfig::hg("hg-url").with_folder("one-folder");
        let common2 = MaterialConfig::hg("hg-url").with_folder("another-folder");

        let graph = diamond(
            vec![common1.clone(), up1_dependency(), up2_dependency()],
            vec![common2.clone(), git(), uppest_dependency()],
            vec![svn(), common2, uppest_dependency()],
            vec![common1.clone(), p4()],
        );

        let current = graph.find("current").unwrap();
        assert_eq!(
            current.unshared_material_configs(),
            vec![&up1_dependency(), &up2_dependency()]
        );

        let up1 = graph.find("up1").unwrap();
        assert_eq!(
            up1.unshared_material_configs(),
            vec![&git(), &uppest_dependency()]
        );

        let up2 = graph.find("up2").unwrap();
        assert_eq!(
            up2.unshared_material_configs(),
            vec![&svn(), &uppest_dependency()]
        );

        let uppest = graph.find("uppest").unwrap();
        assert_eq!(uppest.unshared_material_configs(), vec![&common1, &p4()]);
    }

    #[test]
    fn test_all_material_fingerprints() {
        let common = MaterialConfig::hg("hg-url");
        let graph = diamond(
            vec![common.clone(), up1_dependency(), up2_dependency()],
            vec![common.clone(), git(), uppest_dependency()],
            vec![svn(), common.clone(), uppest_dependency()],
            vec![common.clone(), p4()],
        );

        let fingerprints = graph.root().unwrap().all_material_fingerprints();

        assert_eq!(fingerprints.len(), 7);
        for material in [
            common,
            svn(),
            git(),
            p4(),
            up1_dependency(),
            up2_dependency(),
            uppest_dependency(),
        ] {
            assert!(fingerprints.contains(&material.fingerprint()));
        }
    }

    #[test]
    fn test_shared_revisions_ignored_by_every_upstream() {
        let filtered_p4 = p4().with_filter(Filter::from_patterns(["foo"]));
        let graph = diamond(
            vec![MaterialConfig::hg("hg-url"), up1_dependency(), up2_dependency()],
            vec![filtered_hg("phigar"), git(), uppest_dependency()],
            vec![
                svn(),
                filtered_p4.clone(),
                filtered_hg("phigar"),
                uppest_dependency(),
            ],
            vec![filtered_hg("phigar"), filtered_p4],
        );
        let hg = MaterialConfig::hg("hg-url");

        let current = graph.root().unwrap();
        assert!(current.is_revisions_of_shared_materials_ignored(&revisions_of(&hg, "phigar")));
        assert!(!current.is_revisions_of_shared_materials_ignored(&revisions_of(&hg, "Silly")));

        // svn is unshared for up2, and nobody upstream declares this p4 server
        let other_p4 = MaterialConfig::p4("otherhost:1666", Some("user"), "//depot/...");
        let mut revisions = revisions_of(&svn(), "phigar");
        revisions.add_all(revisions_of(&other_p4, "phigar"));
        revisions.add_all(revisions_of(&hg, "phigar"));

        let up2 = graph.find("up2").unwrap();
        assert!(up2.is_revisions_of_shared_materials_ignored(&revisions));
        assert!(!up2.is_revisions_of_shared_materials_ignored(&revisions_of(&hg, "Silly")));
    }

    #[test]
    fn test_shared_revision_not_ignored_when_one_upstream_cares() {
        let graph = diamond(
            vec![MaterialConfig::hg("hg-url"), up1_dependency(), up2_dependency()],
            vec![filtered_hg("phigar"), uppest_dependency()],
            vec![MaterialConfig::hg("hg-url"), uppest_dependency()],
            vec![filtered_hg("phigar")],
        );
        let hg = MaterialConfig::hg("hg-url");

        let current = graph.root().unwrap();
        assert!(!current.is_revisions_of_shared_materials_ignored(&revisions_of(&hg, "phigar")));
        assert!(current.is_revisions_of_shared_materials_ignored(&MaterialRevisions::default()));
    }

    #[test]
    fn test_from_configs_reports_unknown_upstream() {
        let configs = [pipeline("current", vec![MaterialConfig::dependency("ghost", "first")])];
        let result = DependencyGraph::from_configs("current", |name| {
            configs.iter().find(|config| config.has_name(name)).cloned()
        });

        assert_eq!(
            result.unwrap_err(),
            GraphError::UnknownPipeline("ghost".to_string())
        );
    }

    #[test]
    fn test_from_configs_detects_cycles() {
        let configs = [
            pipeline("a", vec![MaterialConfig::dependency("b", "first")]),
            pipeline("b", vec![MaterialConfig::dependency("A", "first")]),
        ];
        let result = DependencyGraph::from_configs("a", |name| {
            configs.iter().find(|config| config.has_name(name)).cloned()
        });

        assert_eq!(result.unwrap_err(), GraphError::Cycle("a -> b -> a".to_string()));
    }
}
