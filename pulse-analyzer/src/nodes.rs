//! Node attribution by embedding similarity.

use pulse_common::{Error, Result, ResultExt};
use std::sync::Arc;

use crate::cache::AnalysisCaches;
use crate::embedding::{cosine_similarity, EmbeddingService};
use crate::normalizer::TextNormalizer;
use crate::types::{Embedding, Node, NodeMatch};

/// Assigns each text to the most similar node.
pub struct NodeAttributor {
    keyword_limit: usize,
    normalizer: TextNormalizer,
    embeddings: Arc<EmbeddingService>,
    caches: Arc<AnalysisCaches>,
}

impl NodeAttributor {
    pub fn new(
        keyword_limit: usize,
        normalizer: TextNormalizer,
        embeddings: Arc<EmbeddingService>,
        caches: Arc<AnalysisCaches>,
    ) -> Self {
        Self {
            keyword_limit,
            normalizer,
            embeddings,
            caches,
        }
    }

    /// Synthetic context sentence: the node name followed by its leading keywords.
    pub fn context_sentence(&self, node: &Node) -> String {
        let keywords: Vec<&str> = node
            .keywords
            .iter()
            .map(String::as_str)
            .filter(|k| !k.trim().is_empty())
            .take(self.keyword_limit)
            .collect();
        if keywords.is_empty() {
            node.name.clone()
        } else {
            format!("{}: {}", node.name, keywords.join(", "))
        }
    }

    /// Context embedding for a node, rebuilt when its name or keywords change.
    pub async fn node_embedding(&self, node: &Node) -> Result<Embedding> {
        if let Some(hit) = self.caches.nodes.get(node) {
            return Ok(hit);
        }
        let sentence = self.normalizer.normalize(&self.context_sentence(node));
        let embedding = self
            .embeddings
            .embed(&sentence)
            .await
            .context(format!("embedding node {}", node.id))?;
        Ok(self.caches.nodes.insert(node, embedding))
    }

    /// Warm the node cache for a run.
    pub async fn prepare(&self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            self.node_embedding(node).await?;
        }
        Ok(())
    }

    /// Best node for a text embedding.
    ///
    /// Confidence is the raw similarity clamped to [0, 1]. Ties keep the
    /// earlier node in `nodes`.
    pub async fn attribute(&self, text_embedding: &[f32], nodes: &[Node]) -> Result<NodeMatch> {
        let mut best: Option<(&Node, f64)> = None;
        for node in nodes {
            let node_embedding = self.node_embedding(node).await?;
            let similarity = cosine_similarity(text_embedding, &node_embedding);
            match best {
                Some((_, top)) if similarity <= top => {}
                _ => best = Some((node, similarity)),
            }
        }

        let (node, similarity) =
            best.ok_or_else(|| Error::InvalidInput("no nodes to attribute against".into()))?;
        Ok(NodeMatch {
            node_id: node.id.clone(),
            confidence: similarity.clamp(0.0, 1.0),
        })
    }
}

impl std::fmt::Debug for NodeAttributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeAttributor")
            .field("keyword_limit", &self.keyword_limit)
            .finish()
    }
}
