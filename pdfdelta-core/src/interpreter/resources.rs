//! Named resource lookup (ISO 32000-1 Section 7.8.3).

use crate::objects::{Dictionary, Object, ObjectId, Resolve};
use std::sync::Arc;
use tracing::debug;

/// A resource found by name: the value and, when it was referenced, its id.
#[derive(Debug, Clone)]
pub struct NamedResource {
    pub id: Option<ObjectId>,
    pub object: Arc<Object>,
}

impl NamedResource {
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match &*self.object {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream(stream) => Some(stream.dictionary()),
            _ => None,
        }
    }
}

/// The resource dictionary in effect for one content stream. Cheap to clone,
/// so a form without its own resources shares its caller's.
#[derive(Debug, Clone, Default)]
pub struct Resources {
    dict: Option<Arc<Dictionary>>,
}

impl Resources {
    pub fn new(dict: Option<Dictionary>) -> Self {
        Self {
            dict: dict.map(Arc::new),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dict.as_ref().map_or(true, |d| d.is_empty())
    }

    pub fn dictionary(&self) -> Option<&Dictionary> {
        self.dict.as_deref()
    }

    /// Entry `name` of subdictionary `category` (`Font`, `XObject`...).
    pub fn lookup(&self, resolver: &dyn Resolve, category: &str, name: &str) -> Option<NamedResource> {
        let dict = self.dict.as_ref()?;
        let category_dict = resolver.follow(dict.get(category)?);
        let Some(entries) = category_dict.as_dict() else {
            debug!("Resource category {} is a {}", category, category_dict.type_name());
            return None;
        };

        let found = match entries.get(name)? {
            Object::Reference(id) => NamedResource {
                id: Some(*id),
                object: resolver.resolve(*id),
            },
            direct => NamedResource {
                id: None,
                object: Arc::new(direct.clone()),
            },
        };
        if found.object.is_null() {
            debug!("Resource /{} in {} resolves to null", name, category);
            return None;
        }
        Some(found)
    }
}
