//! Depth limits and cycle detection for recursive walks
//!
//! Nested arrays and dictionaries, page-tree inheritance and form XObjects
//! all recurse over input the producer controls. Each walk carries one of
//! these contexts so hostile nesting fails cleanly instead of overflowing.

use super::{ParseError, ParseResult};
use crate::objects::ObjectId;
use std::collections::HashSet;

/// Maximum recursion depth for PDF parsing operations
pub const MAX_RECURSION_DEPTH: usize = 512;

/// Stack-safe walk context
#[derive(Debug)]
pub struct StackSafeContext {
    /// Current recursion depth
    pub depth: usize,
    /// Maximum allowed depth
    pub max_depth: usize,
    /// References currently on the walk path
    pub visited_refs: HashSet<ObjectId>,
}

impl Default for StackSafeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl StackSafeContext {
    pub fn new() -> Self {
        Self::with_limit(MAX_RECURSION_DEPTH)
    }

    pub fn with_limit(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
            visited_refs: HashSet::new(),
        }
    }

    /// Enter a new recursion level
    pub fn enter(&mut self) -> ParseResult<()> {
        if self.depth + 1 > self.max_depth {
            return Err(ParseError::SyntaxError {
                position: 0,
                message: format!(
                    "Maximum recursion depth exceeded: {} (limit: {})",
                    self.depth + 1,
                    self.max_depth
                ),
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Exit a recursion level
    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Mark a reference as being walked; fails if it already is.
    pub fn visit_ref(&mut self, id: ObjectId) -> ParseResult<()> {
        if !self.visited_refs.insert(id) {
            return Err(ParseError::CircularReference);
        }
        Ok(())
    }

    pub fn unvisit_ref(&mut self, id: ObjectId) {
        self.visited_refs.remove(&id);
    }

    pub fn is_visiting(&self, id: ObjectId) -> bool {
        self.visited_refs.contains(&id)
    }
}
