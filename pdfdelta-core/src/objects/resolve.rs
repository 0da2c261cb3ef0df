use crate::objects::{Object, ObjectId};
use std::ops::Deref;
use std::sync::Arc;

/// Anything that can turn a reference into its value.
///
/// Implementations return the missing sentinel (`Null`) for dangling
/// references instead of failing.
pub trait Resolve {
    fn resolve(&self, id: ObjectId) -> Arc<Object>;

    /// `object` itself, or its target when it is a reference.
    fn follow<'a>(&self, object: &'a Object) -> Resolved<'a> {
        match object {
            Object::Reference(id) => Resolved::Shared(self.resolve(*id)),
            other => Resolved::Borrowed(other),
        }
    }
}

/// A value that is either borrowed from its container or shared from the store.
#[derive(Debug, Clone)]
pub enum Resolved<'a> {
    Borrowed(&'a Object),
    Shared(Arc<Object>),
}

impl Deref for Resolved<'_> {
    type Target = Object;

    fn deref(&self) -> &Object {
        match self {
            Resolved::Borrowed(object) => object,
            Resolved::Shared(object) => object,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Fixed(HashMap<ObjectId, Arc<Object>>);

    impl Resolve for Fixed {
        fn resolve(&self, id: ObjectId) -> Arc<Object> {
            self.0.get(&id).cloned().unwrap_or_else(|| Arc::new(Object::Null))
        }
    }

    #[test]
    fn test_follow_resolves_one_reference() {
        let id = ObjectId::new(3, 0);
        let resolver = Fixed(HashMap::from([(id, Arc::new(Object::Integer(7)))]));

        assert_eq!(*resolver.follow(&Object::Reference(id)), Object::Integer(7));
        assert_eq!(*resolver.follow(&Object::Boolean(true)), Object::Boolean(true));
        assert!(resolver.follow(&Object::Reference(ObjectId::new(4, 0))).is_null());
    }
}
