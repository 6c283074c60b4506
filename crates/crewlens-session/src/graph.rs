use crewlens_core::{AgentStatus, LinkStatus, NodeKind};
use serde::{Deserialize, Serialize};

/// Id of the single user node.
pub const USER_NODE_ID: &str = "User";

/// A node of the interaction graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique id; agent name or [`USER_NODE_ID`].
    pub id: String,
    /// User or agent.
    pub kind: NodeKind,
    /// Mirrors the agent status; the user node stays idle.
    pub status: AgentStatus,
}

/// A directed link between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphLink {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Link status.
    pub status: LinkStatus,
}

/// Plain-data copy of the graph for renderers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Nodes in insertion order, user node first.
    pub nodes: Vec<GraphNode>,
    /// Links in insertion order.
    pub links: Vec<GraphLink>,
}

/// User plus agents, with the handoff path of the active request.
///
/// At most one link is `active` at any time (the hot link). Links in
/// `error` are never downgraded; only [`reset`](Self::reset) removes them.
#[derive(Debug, Clone)]
pub struct InteractionGraph {
    nodes: Vec<GraphNode>,
    links: Vec<GraphLink>,
}

impl InteractionGraph {
    /// A graph holding only the user node.
    pub fn new() -> Self {
        Self {
            nodes: vec![GraphNode {
                id: USER_NODE_ID.to_string(),
                kind: NodeKind::User,
                status: AgentStatus::Idle,
            }],
            links: Vec::new(),
        }
    }

    /// Drop every agent node and link, keeping the user node.
    pub fn reset(&mut self) {
        self.nodes.retain(|n| n.kind == NodeKind::User);
        for node in &mut self.nodes {
            node.status = AgentStatus::Idle;
        }
        self.links.clear();
    }

    /// Ensure a node exists.
    pub fn upsert_node(&mut self, id: &str, kind: NodeKind) {
        if self.node(id).is_none() {
            self.nodes.push(GraphNode {
                id: id.to_string(),
                kind,
                status: AgentStatus::Idle,
            });
        }
    }

    /// Set a node's status, creating the node as an agent if needed.
    pub fn set_node_status(&mut self, id: &str, status: AgentStatus) {
        self.upsert_node(id, kind_for(id));
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
            node.status = status;
        }
    }

    /// Ensure a link exists with the given status, creating both endpoints.
    /// An `error` link keeps its status.
    pub fn upsert_link(&mut self, source: &str, target: &str, status: LinkStatus) {
        self.upsert_node(source, kind_for(source));
        self.upsert_node(target, kind_for(target));
        match self
            .links
            .iter_mut()
            .find(|l| l.source == source && l.target == target)
        {
            Some(link) if link.status == LinkStatus::Error => {}
            Some(link) => link.status = status,
            None => self.links.push(GraphLink {
                source: source.to_string(),
                target: target.to_string(),
                status,
            }),
        }
    }

    /// Mark every non-error link other than `source → target` inactive.
    pub fn set_all_other_links_inactive(&mut self, source: &str, target: &str) {
        for link in &mut self.links {
            let is_except = link.source == source && link.target == target;
            if !is_except && link.status == LinkStatus::Active {
                link.status = LinkStatus::Inactive;
            }
        }
    }

    /// Set the status of every link touching `id`.
    pub fn mark_links_touching(&mut self, id: &str, status: LinkStatus) {
        for link in &mut self.links {
            if link.source == id || link.target == id {
                link.status = status;
            }
        }
    }

    /// Make `source → target` the hot link.
    pub fn activate_path(&mut self, source: &str, target: &str) {
        self.upsert_link(source, target, LinkStatus::Active);
        self.set_all_other_links_inactive(source, target);
    }

    /// Extend the execution path to `agent`.
    ///
    /// The new link starts at the head of the current path (the hot link's
    /// target), or at the user node when no link is hot. Nothing changes if
    /// `agent` already is the head.
    pub fn engage(&mut self, agent: &str) {
        let source = match self.hot_link() {
            Some(link) if link.target == agent => return,
            Some(link) => link.target.clone(),
            None => USER_NODE_ID.to_string(),
        };
        if source == agent {
            return;
        }
        self.activate_path(&source, agent);
    }

    /// The active link, if any.
    pub fn hot_link(&self) -> Option<&GraphLink> {
        self.links.iter().find(|l| l.status == LinkStatus::Active)
    }

    /// Whether any link points at `id`.
    pub fn has_incoming(&self, id: &str) -> bool {
        self.links.iter().any(|l| l.target == id)
    }

    /// Look up a link.
    pub fn link(&self, source: &str, target: &str) -> Option<&GraphLink> {
        self.links
            .iter()
            .find(|l| l.source == source && l.target == target)
    }

    /// Look up a node.
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Links in insertion order.
    pub fn links(&self) -> &[GraphLink] {
        &self.links
    }

    /// Owned copy for renderers.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.clone(),
            links: self.links.clone(),
        }
    }
}

impl Default for InteractionGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_for(id: &str) -> NodeKind {
    if id == USER_NODE_ID {
        NodeKind::User
    } else {
        NodeKind::Agent
    }
}
