use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::protocol::GroundingMetadata;

/// A citation returned by a search step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingLink {
    pub uri: String,
    pub title: String,
}

/// The most recent citations, oldest evicted first
#[derive(Debug, Clone, Serialize)]
pub struct GroundingLinkRing {
    links: VecDeque<GroundingLink>,
    cap: usize,
}

impl GroundingLinkRing {
    pub fn new(cap: usize) -> Self {
        Self {
            links: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, link: GroundingLink) {
        if self.cap == 0 {
            return;
        }
        while self.links.len() >= self.cap {
            self.links.pop_front();
        }
        self.links.push_back(link);
    }

    pub fn extend(&mut self, links: impl IntoIterator<Item = GroundingLink>) {
        for link in links {
            self.push(link);
        }
    }

    pub fn clear(&mut self) {
        self.links.clear();
    }

    pub fn to_vec(&self) -> Vec<GroundingLink> {
        self.links.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

/// Web citations with a non-empty uri
pub fn links_from_metadata(metadata: &GroundingMetadata) -> Vec<GroundingLink> {
    metadata
        .grounding_chunks
        .iter()
        .filter_map(|chunk| chunk.web.as_ref())
        .filter(|web| !web.uri.trim().is_empty())
        .map(|web| GroundingLink {
            uri: web.uri.clone(),
            title: web.title.clone(),
        })
        .collect()
}
