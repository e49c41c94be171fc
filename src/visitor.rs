// src/visitor.rs

//! Traversal of the metadata element tree.
//!
//! The decoded tree ([`Element`]) is small but irregular, and recorders may
//! attach attributes this crate does not fold into descriptors.
//! [`MetadataVisitor`] exposes the raw tree to callers that need more than
//! the [`TypePool`] view, one callback per element kind, without committing
//! them to the tree's physical shape.
//!
//! [`TypePool`]: crate::metadata::TypePool

use crate::metadata::{ChunkMetadata, Element, kinds};

/// Visitor verdict steering a metadata tree walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Descend into this element's children.
    #[default]
    Continue,
    /// Skip this element's children, keep walking siblings.
    Skip,
    /// End the whole walk. Not an error.
    Stop,
}

/// Receives the elements of a metadata tree in document order.
///
/// Every method has a default body, so implementors override only the kinds
/// they care about: entering an element dispatches to the method named after
/// its kind, and [`visit_end`](MetadataVisitor::visit_end) fires once when
/// the element's subtree finishes. A [`Flow::Stop`] verdict ends the walk
/// immediately, with no further calls, including pending `visit_end`s.
pub trait MetadataVisitor {
    /// The document root.
    fn visit_root(&mut self, element: &Element) -> Flow {
        let _ = element;
        Flow::Continue
    }

    /// The container of all class declarations.
    fn visit_metadata(&mut self, element: &Element) -> Flow {
        let _ = element;
        Flow::Continue
    }

    /// The chunk's locale and time-zone element.
    fn visit_region(&mut self, element: &Element) -> Flow {
        let _ = element;
        Flow::Continue
    }

    /// One type declaration.
    fn visit_class(&mut self, element: &Element) -> Flow {
        let _ = element;
        Flow::Continue
    }

    /// One field of a type.
    fn visit_field(&mut self, element: &Element) -> Flow {
        let _ = element;
        Flow::Continue
    }

    /// An annotation on a type or field.
    fn visit_annotation(&mut self, element: &Element) -> Flow {
        let _ = element;
        Flow::Continue
    }

    /// A recorder setting on an event type.
    fn visit_setting(&mut self, element: &Element) -> Flow {
        let _ = element;
        Flow::Continue
    }

    /// Exit hook, called once per element after its children.
    fn visit_end(&mut self, element: &Element) {
        let _ = element;
    }
}

/// Drives `visitor` over `element` and its subtree, depth first.
///
/// Returns [`Flow::Stop`] if the visitor ended the walk early, otherwise
/// [`Flow::Continue`]. A [`Flow::Skip`] verdict never escapes: it prunes the
/// children and the walk moves on.
pub fn walk_element<V>(element: &Element, visitor: &mut V) -> Flow
where
    V: MetadataVisitor + ?Sized,
{
    let verdict = match &*element.name {
        kinds::ROOT => visitor.visit_root(element),
        kinds::METADATA => visitor.visit_metadata(element),
        kinds::REGION => visitor.visit_region(element),
        kinds::CLASS => visitor.visit_class(element),
        kinds::FIELD => visitor.visit_field(element),
        kinds::ANNOTATION => visitor.visit_annotation(element),
        kinds::SETTING => visitor.visit_setting(element),
        // Parsing rejects unknown kinds, so this arm only serves trees
        // assembled by hand.
        _ => Flow::Continue,
    };
    match verdict {
        Flow::Stop => return Flow::Stop,
        Flow::Skip => {}
        Flow::Continue => {
            for child in &element.children {
                if walk_element(child, visitor) == Flow::Stop {
                    return Flow::Stop;
                }
            }
        }
    }
    visitor.visit_end(element);
    Flow::Continue
}

impl ChunkMetadata {
    /// Walks the chunk's whole element tree with `visitor`.
    ///
    /// Equivalent to [`walk_element`] on [`root`](ChunkMetadata::root).
    pub fn walk<V>(&self, visitor: &mut V) -> Flow
    where
        V: MetadataVisitor + ?Sized,
    {
        walk_element(self.root(), visitor)
    }
}
