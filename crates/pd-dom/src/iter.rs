//! Live pre-order node iteration.

use core::ops::BitOr;

use crate::Document;
use crate::NodeId;
use crate::NodeKind;

/// Bit mask selecting which node kinds a [`NodeIterator`] yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WhatToShow(u32);

impl WhatToShow {
    pub const ELEMENT: Self = Self(0x1);
    pub const TEXT: Self = Self(0x4);
    pub const PROCESSING_INSTRUCTION: Self = Self(0x40);
    pub const COMMENT: Self = Self(0x80);
    pub const DOCUMENT: Self = Self(0x100);
    pub const DOCUMENT_TYPE: Self = Self(0x200);
    pub const ALL: Self = Self(0xFFFF_FFFF);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn accepts(self, kind: NodeKind) -> bool {
        let bit = match kind {
            NodeKind::Element => Self::ELEMENT,
            NodeKind::Text => Self::TEXT,
            NodeKind::ProcessingInstruction => Self::PROCESSING_INSTRUCTION,
            NodeKind::Comment => Self::COMMENT,
            NodeKind::Document => Self::DOCUMENT,
            NodeKind::Doctype => Self::DOCUMENT_TYPE,
        };
        self.0 & bit.0 != 0
    }
}

impl BitOr for WhatToShow {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Cursor over a subtree in document order, starting with the root itself.
///
/// The iterator holds no borrow of the document: every call to
/// [`NodeIterator::next_node`] computes the successor of the last returned
/// node from the tree's current links, so callers may mutate node payloads
/// between steps.
#[derive(Debug, Clone)]
pub struct NodeIterator {
    root: NodeId,
    what_to_show: WhatToShow,
    reference: Option<NodeId>,
    finished: bool,
}

impl NodeIterator {
    pub fn new(root: NodeId, what_to_show: WhatToShow) -> Self {
        Self {
            root,
            what_to_show,
            reference: None,
            finished: false,
        }
    }

    pub fn next_node(&mut self, document: &Document) -> Option<NodeId> {
        if self.finished {
            return None;
        }

        let mut candidate = match self.reference {
            None => document.contains(self.root).then_some(self.root),
            Some(reference) => document.following(reference, self.root),
        };

        while let Some(id) = candidate {
            self.reference = Some(id);
            if document
                .kind(id)
                .is_some_and(|kind| self.what_to_show.accepts(kind))
            {
                return Some(id);
            }
            candidate = document.following(id, self.root);
        }

        self.finished = true;
        None
    }
}
