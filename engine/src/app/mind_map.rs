//! Mind-map graph derived from a user's profile
//!
//! Nodes carry no positions; laying the graph out is left to the client.

use serde::Serialize;

use crate::db::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    Summary,
    Belief,
    Trigger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MindMapNode {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MindMapEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MindMap {
    pub nodes: Vec<MindMapNode>,
    pub edges: Vec<MindMapEdge>,
}

impl MindMap {
    fn node(&mut self, id: impl Into<String>, kind: NodeKind, label: String) {
        self.nodes.push(MindMapNode {
            id: id.into(),
            kind,
            label,
        });
    }

    fn edge(&mut self, source: &str, target: &str) {
        self.edges.push(MindMapEdge {
            id: format!("e-{}-{}", source, target),
            source: source.to_string(),
            target: target.to_string(),
        });
    }
}

/// Root, then the summary (if any), then a belief and trigger per insight
pub fn build(user: &User) -> MindMap {
    let mut map = MindMap::default();
    map.node("root", NodeKind::Root, "Your Cognitive Mind".to_string());

    let mut parent = "root";
    if let Some(summary) = user
        .long_term_profile_summary
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        map.node("summary", NodeKind::Summary, format!("Summary: {}", summary));
        map.edge("root", "summary");
        parent = "summary";
    }

    for (i, insight) in user.key_insights.iter().flatten().enumerate() {
        let belief_id = format!("belief-{}", i);
        let trigger_id = format!("trigger-{}", i);

        map.node(
            belief_id.clone(),
            NodeKind::Belief,
            format!("Belief: \"{}\"", insight.belief),
        );
        map.edge(parent, &belief_id);

        map.node(
            trigger_id.clone(),
            NodeKind::Trigger,
            format!("Trigger: {}", insight.trigger),
        );
        map.edge(&belief_id, &trigger_id);
    }

    map
}
