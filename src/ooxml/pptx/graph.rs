//! Reachability over the parts of a presentation.
//!
//! Nodes are parts (plus the package itself), edges are internal
//! relationships and the presentation's slide order. A slide relationship of
//! the presentation part only counts as an edge when the order manifest lists
//! its id: a slide that is not shown is not reachable.

use crate::ooxml::opc::constants::kind;
use crate::ooxml::opc::error::Result;
use crate::ooxml::opc::package::Package;
use crate::ooxml::opc::packuri::{CONTENT_TYPES_MEMBER, PackURI};
use crate::ooxml::pptx::manifest::OrderManifest;
use fixedbitset::FixedBitSet;
use smallvec::SmallVec;
use std::collections::{HashMap, VecDeque};

/// Node name of the package itself.
pub const PACKAGE_NODE: &str = "/";

/// An internal relationship whose target part does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingLink {
    /// Member name of the `.rels` part declaring the relationship.
    pub rels_part: String,
    pub r_id: String,
    /// Resolved target member name.
    pub target: String,
}

#[derive(Debug, Clone)]
pub struct RelationshipGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<SmallVec<[usize; 4]>>,
    roots: Vec<usize>,
    dangling: Vec<DanglingLink>,
}

impl RelationshipGraph {
    /// Build the graph for the current state of `package`.
    ///
    /// Parts in discard directories take no part in the graph: they are
    /// neither roots nor targets, and their relationships are ignored.
    /// Fails only if a relationships part or the presentation part is
    /// malformed XML.
    pub fn build(package: &Package) -> Result<Self> {
        let config = package.config();
        let mut graph = Self {
            names: Vec::with_capacity(package.part_count() + 1),
            index: HashMap::with_capacity(package.part_count() + 1),
            edges: Vec::with_capacity(package.part_count() + 1),
            roots: Vec::new(),
            dangling: Vec::new(),
        };

        let package_node = graph.intern(PACKAGE_NODE);
        graph.roots.push(package_node);
        for name in package.part_names() {
            if config.is_discarded(name) {
                continue;
            }
            let node = graph.intern(name);
            if name == CONTENT_TYPES_MEMBER || !config.is_reclaimable(name) {
                graph.roots.push(node);
            }
        }

        let main = package.main_document().ok();
        let manifest = match &main {
            Some(main) => Some(OrderManifest::from_xml(package.xml(main.membername())?)?),
            None => None,
        };

        for part in package.iter_parts() {
            let rels_uri = part.partname();
            if !rels_uri.is_rels() || config.is_discarded(rels_uri.membername()) {
                continue;
            }
            let Some(source) = rels_uri.rels_source() else {
                continue;
            };
            let source_name = node_name(&source);
            let Some(&source_node) = graph.index.get(source_name) else {
                continue;
            };
            let Some(&rels_node) = graph.index.get(rels_uri.membername()) else {
                continue;
            };
            graph.edges[source_node].push(rels_node);

            let is_main = main.as_ref() == Some(&source);
            let rels = package.relationships(&source)?;
            for rel in rels.iter().filter(|rel| !rel.is_external()) {
                if is_main
                    && rel.kind() == kind::SLIDE
                    && !manifest.as_ref().is_some_and(|m| m.contains_r_id(rel.r_id()))
                {
                    continue;
                }
                let Ok(target) = rel.target_partname() else {
                    continue;
                };
                let target_name = target.membername();
                if config.is_discarded(target_name) {
                    continue;
                }
                match graph.index.get(target_name) {
                    Some(&target_node) => graph.edges[source_node].push(target_node),
                    None => graph.dangling.push(DanglingLink {
                        rels_part: rels_uri.membername().to_string(),
                        r_id: rel.r_id().to_string(),
                        target: target_name.to_string(),
                    }),
                }
            }
        }

        Ok(graph)
    }

    fn intern(&mut self, name: &str) -> usize {
        if let Some(&node) = self.index.get(name) {
            return node;
        }
        let node = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), node);
        self.edges.push(SmallVec::new());
        node
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Member names this node links to, in relationship order.
    pub fn edges_from<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.index
            .get(name)
            .into_iter()
            .flat_map(move |&node| self.edges[node].iter().map(move |&t| self.names[t].as_str()))
    }

    /// Internal relationships whose target does not exist.
    #[inline]
    pub fn dangling(&self) -> &[DanglingLink] {
        &self.dangling
    }

    /// Breadth-first traversal from the root set.
    pub fn reachable(&self) -> FixedBitSet {
        let mut visited = FixedBitSet::with_capacity(self.names.len());
        let mut queue: VecDeque<usize> = VecDeque::with_capacity(self.roots.len());
        for &root in &self.roots {
            if !visited.put(root) {
                queue.push_back(root);
            }
        }
        while let Some(node) = queue.pop_front() {
            for &next in &self.edges[node] {
                if !visited.put(next) {
                    queue.push_back(next);
                }
            }
        }
        visited
    }

    /// Whether `name` is in a reachable set computed by [`reachable`](Self::reachable).
    pub fn is_reachable(&self, reachable: &FixedBitSet, name: &str) -> bool {
        self.index.get(name).is_some_and(|&node| reachable.contains(node))
    }

    /// Parts not reached from the root set, sorted.
    pub fn unreachable(&self) -> Vec<&str> {
        let reachable = self.reachable();
        let mut names: Vec<&str> = self
            .names
            .iter()
            .enumerate()
            .filter(|(node, _)| !reachable.contains(*node))
            .map(|(_, name)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

fn node_name(uri: &PackURI) -> &str {
    if uri.is_package() {
        PACKAGE_NODE
    } else {
        uri.membername()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::fixtures::FixtureBuilder;
    use crate::ooxml::pptx::manifest::OrderManifest;

    fn drop_from_manifest(pkg: &mut Package, id: u32) {
        let main = pkg.main_document().unwrap();
        let mut manifest = OrderManifest::from_xml(pkg.xml(main.membername()).unwrap()).unwrap();
        manifest.remove(id).unwrap();
        let xml = manifest.apply_to(pkg.xml(main.membername()).unwrap()).unwrap();
        pkg.put_xml(&main, xml);
    }

    #[test]
    fn test_everything_reachable_in_fresh_deck() {
        let pkg = Package::from_bytes(
            FixtureBuilder::new().slides(3).notes_on(2).image_on_first_slide().build(),
        )
        .unwrap();
        let graph = RelationshipGraph::build(&pkg).unwrap();
        assert!(graph.unreachable().is_empty());
        assert!(graph.dangling().is_empty());
        assert_eq!(graph.node_count(), pkg.part_count() + 1);
    }

    #[test]
    fn test_slide_outside_manifest_is_unreachable() {
        let mut pkg = Package::from_bytes(FixtureBuilder::new().slides(3).build()).unwrap();
        drop_from_manifest(&mut pkg, 257);
        let graph = RelationshipGraph::build(&pkg).unwrap();
        assert_eq!(
            graph.unreachable(),
            vec!["ppt/slides/_rels/slide2.xml.rels", "ppt/slides/slide2.xml"]
        );
    }

    #[test]
    fn test_edges_and_dangling_links() {
        let mut pkg = Package::from_bytes(FixtureBuilder::new().slides(1).build()).unwrap();
        let graph = RelationshipGraph::build(&pkg).unwrap();
        let edges: Vec<&str> = graph.edges_from("ppt/slides/slide1.xml").collect();
        assert_eq!(
            edges,
            vec!["ppt/slides/_rels/slide1.xml.rels", "ppt/slideLayouts/slideLayout1.xml"]
        );

        pkg.remove_part("ppt/slideLayouts/slideLayout1.xml");
        let graph = RelationshipGraph::build(&pkg).unwrap();
        assert!(graph.dangling().iter().any(|d| {
            d.rels_part == "ppt/slides/_rels/slide1.xml.rels"
                && d.target == "ppt/slideLayouts/slideLayout1.xml"
        }));
    }

    #[test]
    fn test_discarded_parts_are_not_nodes() {
        let pkg = Package::from_bytes(
            FixtureBuilder::new()
                .with_entry("[trash]/old.xml", b"<x/>")
                .build(),
        )
        .unwrap();
        let graph = RelationshipGraph::build(&pkg).unwrap();
        assert_eq!(graph.node_count(), pkg.part_count());
        assert_eq!(graph.edges_from("[trash]/old.xml").count(), 0);
    }
}
