//! PDF Page Tree Parser
//!
//! Flattens the page tree (ISO 32000-1 Section 7.7.3) into an ordered list of
//! page references and resolves the attributes a page inherits from its
//! ancestors: `Resources`, `MediaBox`, `CropBox` and `Rotate`.

use super::stack_safe::StackSafeContext;
use super::{ParseError, ParseResult};
use crate::objects::{Dictionary, Object, ObjectId, Resolve};
use std::collections::HashSet;
use tracing::warn;

/// US Letter, used when no ancestor declares a MediaBox.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// A page dictionary with its inherited attributes filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    /// Reference of the page object
    pub id: ObjectId,
    /// The page dictionary as stored
    pub dict: Dictionary,
    /// Own or inherited resources, resolved to a dictionary
    pub resources: Option<Dictionary>,
    /// Page dimensions in PDF units [llx, lly, urx, ury]
    pub media_box: [f64; 4],
    /// Visible area. If None, the entire MediaBox is visible.
    pub crop_box: Option<[f64; 4]>,
    /// Page rotation in degrees, clockwise
    pub rotation: i32,
}

impl ParsedPage {
    pub fn width(&self) -> f64 {
        (self.media_box[2] - self.media_box[0]).abs()
    }

    pub fn height(&self) -> f64 {
        (self.media_box[3] - self.media_box[1]).abs()
    }

    /// Entries of `/Contents`: a single stream or an array of them.
    pub fn content_refs(&self) -> Vec<Object> {
        match self.dict.get("Contents") {
            Some(Object::Array(items)) => items.clone(),
            Some(Object::Null) | None => Vec::new(),
            Some(other) => vec![other.clone()],
        }
    }
}

/// Page tree navigator
#[derive(Debug, Clone)]
pub struct PageTree {
    root: ObjectId,
    pages: Vec<ObjectId>,
}

impl PageTree {
    /// Walk the tree under the `Pages` node `root` in document order.
    pub fn load(resolver: &dyn Resolve, root: ObjectId, max_depth: usize) -> ParseResult<Self> {
        let mut pages = Vec::new();
        let mut context = StackSafeContext::with_limit(max_depth);
        collect_pages(resolver, root, &mut context, &mut pages)?;

        if let Some(declared) = resolver.resolve(root).as_dict().and_then(|d| d.get_integer("Count")) {
            if usize::try_from(declared).ok() != Some(pages.len()) {
                warn!("Page tree declares {} pages, found {}", declared, pages.len());
            }
        }

        Ok(Self { root, pages })
    }

    pub fn root(&self) -> ObjectId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page_id(&self, index: usize) -> Option<ObjectId> {
        self.pages.get(index).copied()
    }

    pub fn page_ids(&self) -> &[ObjectId] {
        &self.pages
    }

    /// Page `index` with its inherited attributes.
    pub fn page(&self, resolver: &dyn Resolve, index: usize) -> ParseResult<ParsedPage> {
        let id = self
            .page_id(index)
            .ok_or_else(|| ParseError::MissingKey(format!("page {index}")))?;
        let object = resolver.resolve(id);
        let dict = object
            .as_dict()
            .ok_or(ParseError::InvalidReference(id.number(), id.generation()))?
            .clone();

        let resources = inherited(resolver, &dict, "Resources").and_then(|value| match value {
            Object::Dictionary(resources) => Some(resources),
            other => {
                warn!("Resources of page {} is a {}", id, other.type_name());
                None
            }
        });
        let media_box = inherited(resolver, &dict, "MediaBox")
            .and_then(|value| rectangle(resolver, &value))
            .unwrap_or(DEFAULT_MEDIA_BOX);
        let crop_box = inherited(resolver, &dict, "CropBox").and_then(|value| rectangle(resolver, &value));
        let rotation = inherited(resolver, &dict, "Rotate")
            .and_then(|value| value.as_integer())
            .map_or(0, |r| (r.rem_euclid(360)) as i32);

        Ok(ParsedPage {
            id,
            dict,
            resources,
            media_box,
            crop_box,
            rotation,
        })
    }
}

fn collect_pages(
    resolver: &dyn Resolve,
    node_id: ObjectId,
    context: &mut StackSafeContext,
    pages: &mut Vec<ObjectId>,
) -> ParseResult<()> {
    if context.is_visiting(node_id) {
        warn!("Page tree cycle through {}", node_id);
        return Ok(());
    }
    context.enter()?;
    context.visit_ref(node_id)?;

    let node = resolver.resolve(node_id);
    match node.as_dict() {
        Some(dict) if is_page_node(dict) => pages.push(node_id),
        Some(dict) => {
            let kids = dict.get("Kids").map(|kids| resolver.follow(kids));
            match kids.as_deref().and_then(Object::as_array) {
                Some(kids) => {
                    for kid in kids {
                        match kid {
                            Object::Reference(kid_id) => collect_pages(resolver, *kid_id, context, pages)?,
                            other => warn!("Skipping direct {} in Kids of {}", other.type_name(), node_id),
                        }
                    }
                }
                None => warn!("Pages node {} has no Kids array", node_id),
            }
        }
        None => warn!("Page tree node {} is a {}", node_id, node.type_name()),
    }

    context.exit();
    // Only ancestors count as a cycle; a page reachable twice is listed twice
    context.unvisit_ref(node_id);
    Ok(())
}

fn is_page_node(dict: &Dictionary) -> bool {
    match dict.get_name("Type") {
        Some("Page") => true,
        Some("Pages") => false,
        _ => !dict.contains_key("Kids"),
    }
}

/// `key` from the page or its nearest ancestor, resolved one level.
fn inherited(resolver: &dyn Resolve, page: &Dictionary, key: &str) -> Option<Object> {
    if let Some(value) = page.get(key) {
        return Some((*resolver.follow(value)).clone());
    }

    let mut seen = HashSet::new();
    let mut parent = page.get_reference("Parent");
    while let Some(parent_id) = parent {
        if !seen.insert(parent_id) {
            warn!("Parent chain cycle through {}", parent_id);
            return None;
        }
        let node = resolver.resolve(parent_id);
        let dict = node.as_dict()?;
        if let Some(value) = dict.get(key) {
            return Some((*resolver.follow(value)).clone());
        }
        parent = dict.get_reference("Parent");
    }
    None
}

fn rectangle(resolver: &dyn Resolve, value: &Object) -> Option<[f64; 4]> {
    let items = value.as_array()?;
    if items.len() != 4 {
        return None;
    }
    let mut rect = [0.0; 4];
    for (slot, item) in rect.iter_mut().zip(items) {
        *slot = resolver.follow(item).as_number()?;
    }
    Some(rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct Objects(HashMap<u32, Object>);

    impl Resolve for Objects {
        fn resolve(&self, id: ObjectId) -> Arc<Object> {
            Arc::new(self.0.get(&id.number()).cloned().unwrap_or(Object::Null))
        }
    }

    fn dict(entries: Vec<(&str, Object)>) -> Object {
        Object::Dictionary(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn r(number: u32) -> Object {
        Object::Reference(ObjectId::new(number, 0))
    }

    fn numbers(values: &[f64]) -> Object {
        Object::Array(values.iter().map(|v| Object::Real(*v)).collect())
    }

    fn sample_tree() -> Objects {
        let mut objects = HashMap::new();
        objects.insert(
            2,
            dict(vec![
                ("Type", Object::Name("Pages".into())),
                ("Kids", Object::Array(vec![r(3), r(4)])),
                ("Count", Object::Integer(3)),
                ("MediaBox", numbers(&[0.0, 0.0, 200.0, 100.0])),
                ("Resources", r(9)),
                ("Rotate", Object::Integer(-90)),
            ]),
        );
        objects.insert(3, dict(vec![("Type", Object::Name("Page".into())), ("Parent", r(2))]));
        objects.insert(
            4,
            dict(vec![
                ("Type", Object::Name("Pages".into())),
                ("Parent", r(2)),
                ("Kids", Object::Array(vec![r(5), r(6)])),
                ("CropBox", numbers(&[10.0, 10.0, 50.0, 50.0])),
            ]),
        );
        objects.insert(
            5,
            dict(vec![
                ("Parent", r(4)),
                ("MediaBox", numbers(&[0.0, 0.0, 30.0, 40.0])),
                ("Contents", Object::Array(vec![r(7), r(8)])),
            ]),
        );
        // Cycle back to the root
        objects.insert(6, dict(vec![("Type", Object::Name("Pages".into())), ("Kids", Object::Array(vec![r(2)]))]));
        objects.insert(9, dict(vec![("Font", dict(vec![]))]));
        Objects(objects)
    }

    #[test]
    fn test_flatten_in_order_with_cycle() {
        let objects = sample_tree();
        let tree = PageTree::load(&objects, ObjectId::new(2, 0), 64).unwrap();
        assert_eq!(tree.page_ids(), &[ObjectId::new(3, 0), ObjectId::new(5, 0)]);
        assert_eq!(tree.root(), ObjectId::new(2, 0));
    }

    #[test]
    fn test_inherited_attributes() {
        let objects = sample_tree();
        let tree = PageTree::load(&objects, ObjectId::new(2, 0), 64).unwrap();

        let first = tree.page(&objects, 0).unwrap();
        assert_eq!(first.media_box, [0.0, 0.0, 200.0, 100.0]);
        assert_eq!(first.crop_box, None);
        assert_eq!(first.rotation, 270);
        assert!(first.resources.as_ref().unwrap().contains_key("Font"));
        assert!(first.content_refs().is_empty());

        let second = tree.page(&objects, 1).unwrap();
        assert_eq!(second.media_box, [0.0, 0.0, 30.0, 40.0]);
        assert_eq!(second.crop_box, Some([10.0, 10.0, 50.0, 50.0]));
        assert_eq!(second.width(), 30.0);
        assert_eq!(second.content_refs().len(), 2);
    }

    #[test]
    fn test_out_of_range_page() {
        let objects = sample_tree();
        let tree = PageTree::load(&objects, ObjectId::new(2, 0), 64).unwrap();
        assert!(tree.page(&objects, 2).is_err());
    }

    #[test]
    fn test_missing_media_box_defaults_to_letter() {
        let mut objects = HashMap::new();
        objects.insert(1, dict(vec![("Type", Object::Name("Pages".into())), ("Kids", Object::Array(vec![r(2)]))]));
        objects.insert(2, dict(vec![("Type", Object::Name("Page".into())), ("Parent", r(1))]));
        let objects = Objects(objects);

        let tree = PageTree::load(&objects, ObjectId::new(1, 0), 64).unwrap();
        let page = tree.page(&objects, 0).unwrap();
        assert_eq!(page.media_box, DEFAULT_MEDIA_BOX);
        assert_eq!(page.resources, None);
    }
}
