// Scope chain as an arena of frames
// Frames store a parent index instead of a parent pointer, so child frames
// are cheap to create and the chain cannot form ownership cycles. One arena
// belongs to exactly one render call.

use indexmap::IndexMap;

use crate::value::Value;

/// Handle to a frame inside a [`ScopeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

#[derive(Debug)]
struct Frame {
    vars: IndexMap<String, Value>,
    parent: Option<ScopeId>,
}

/// Arena of name→value frames. Lookup walks innermost-to-outermost.
#[derive(Debug, Default)]
pub struct ScopeArena {
    frames: Vec<Frame>,
}

impl ScopeArena {
    pub fn new() -> Self {
        ScopeArena { frames: Vec::new() }
    }

    /// Create a root frame with no parent, seeded with `vars`.
    pub fn root(&mut self, vars: IndexMap<String, Value>) -> ScopeId {
        self.frames.push(Frame { vars, parent: None });
        ScopeId(self.frames.len() - 1)
    }

    /// Create an empty child frame of `parent`.
    pub fn child(&mut self, parent: ScopeId) -> ScopeId {
        self.frames.push(Frame {
            vars: IndexMap::new(),
            parent: Some(parent),
        });
        ScopeId(self.frames.len() - 1)
    }

    /// Bind `name` in exactly the given frame, shadowing any outer binding.
    pub fn bind(&mut self, frame: ScopeId, name: impl Into<String>, value: Value) {
        self.frames[frame.0].vars.insert(name.into(), value);
    }

    /// Resolve `name` starting at `frame` and walking parent frames.
    pub fn lookup(&self, frame: ScopeId, name: &str) -> Option<&Value> {
        let mut current = Some(frame);
        while let Some(id) = current {
            let f = &self.frames[id.0];
            if let Some(v) = f.vars.get(name) {
                return Some(v);
            }
            current = f.parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_with(entries: &[(&str, Value)]) -> (ScopeArena, ScopeId) {
        let mut arena = ScopeArena::new();
        let mut vars = IndexMap::new();
        for (k, v) in entries {
            vars.insert(k.to_string(), v.clone());
        }
        let root = arena.root(vars);
        (arena, root)
    }

    #[test]
    fn test_lookup_walks_to_parent() {
        let (mut arena, root) = root_with(&[("numbers", Value::from(1i64))]);
        let child = arena.child(root);
        let grandchild = arena.child(child);

        assert_eq!(
            arena.lookup(grandchild, "numbers"),
            Some(&Value::from(1i64))
        );
        assert_eq!(arena.lookup(grandchild, "missing"), None);
    }

    #[test]
    fn test_inner_binding_shadows_outer() {
        let (mut arena, root) = root_with(&[("it", Value::from("outer"))]);
        let child = arena.child(root);
        arena.bind(child, "it", Value::from("inner"));

        assert_eq!(arena.lookup(child, "it"), Some(&Value::from("inner")));
        assert_eq!(arena.lookup(root, "it"), Some(&Value::from("outer")));
    }

    #[test]
    fn test_sibling_frames_do_not_share() {
        let (mut arena, root) = root_with(&[]);
        let a = arena.child(root);
        let b = arena.child(root);
        arena.bind(a, "x", Value::from(1i64));

        assert_eq!(arena.lookup(a, "x"), Some(&Value::from(1i64)));
        assert_eq!(arena.lookup(b, "x"), None);
    }

    #[test]
    fn test_bind_into_named_frame() {
        // assignTo binds into the page frame while a deeper pipeline frame
        // is current; the binding must be visible from later siblings.
        let (mut arena, root) = root_with(&[]);
        let page = arena.child(root);
        let pipeline = arena.child(page);

        arena.bind(page, "waCustomers", Value::from("bound"));
        assert_eq!(
            arena.lookup(pipeline, "waCustomers"),
            Some(&Value::from("bound"))
        );

        let later = arena.child(page);
        assert_eq!(
            arena.lookup(later, "waCustomers"),
            Some(&Value::from("bound"))
        );
    }
}
