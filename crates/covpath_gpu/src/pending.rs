//! Per-render-target bookkeeping of paths waiting for a flush
//!
//! The registry owns every draw op in a slot arena. Ops refer to their
//! render target by [`OpListId`] and targets list their ops by
//! [`DrawOpKey`], so neither side holds a pointer to the other.

use covpath_paint::PathId;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::clip::ClipPath;
use crate::draw_op::DrawPathsOp;

slotmap::new_key_type! {
    /// Handle to a draw op owned by the registry
    pub struct DrawOpKey;
}

/// Identity of a render target's op list
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpListId(pub u32);

/// Paths recorded against one render target since its last flush
#[derive(Debug, Default)]
pub struct RtPendingPaths {
    pub(crate) draw_ops: Vec<DrawOpKey>,
    pub(crate) clip_paths: FxHashMap<PathId, ClipPath>,
}

impl RtPendingPaths {
    pub fn draw_ops(&self) -> &[DrawOpKey] {
        &self.draw_ops
    }

    pub fn clip_path(&self, id: PathId) -> Option<&ClipPath> {
        self.clip_paths.get(&id)
    }

    pub fn clip_path_count(&self) -> usize {
        self.clip_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draw_ops.is_empty() && self.clip_paths.is_empty()
    }
}

/// Owner of all pending draw ops and clip paths
#[derive(Debug, Default)]
pub struct PendingPathsRegistry {
    ops: SlotMap<DrawOpKey, DrawPathsOp>,
    targets: FxHashMap<OpListId, RtPendingPaths>,
}

impl PendingPathsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no target has anything pending
    pub fn is_empty(&self) -> bool {
        self.targets.values().all(RtPendingPaths::is_empty)
    }

    pub fn lookup_or_create(&mut self, id: OpListId) -> &mut RtPendingPaths {
        self.targets.entry(id).or_default()
    }

    pub fn get(&self, id: OpListId) -> Option<&RtPendingPaths> {
        self.targets.get(&id)
    }

    pub fn get_mut(&mut self, id: OpListId) -> Option<&mut RtPendingPaths> {
        self.targets.get_mut(&id)
    }

    pub fn contains(&self, id: OpListId) -> bool {
        self.targets.contains_key(&id)
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Drop a target's entry along with every op it owns.
    ///
    /// Returns the number of ops freed.
    pub fn erase(&mut self, id: OpListId) -> usize {
        let Some(pending) = self.targets.remove(&id) else {
            return 0;
        };
        pending
            .draw_ops
            .into_iter()
            .filter(|key| self.ops.remove(*key).is_some())
            .count()
    }

    pub fn insert_op(&mut self, op: DrawPathsOp) -> DrawOpKey {
        self.ops.insert(op)
    }

    pub fn op(&self, key: DrawOpKey) -> Option<&DrawPathsOp> {
        self.ops.get(key)
    }

    pub fn op_mut(&mut self, key: DrawOpKey) -> Option<&mut DrawPathsOp> {
        self.ops.get_mut(key)
    }

    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// Append `key` to the op list of `owner`
    pub fn link(&mut self, owner: OpListId, key: DrawOpKey) {
        self.lookup_or_create(owner).draw_ops.push(key);
    }

    /// Take an op out of the arena, unlinking it from its owner
    pub fn remove_op(&mut self, key: DrawOpKey) -> Option<DrawPathsOp> {
        let op = self.ops.remove(key)?;
        if let Some(pending) = op.owner().and_then(|owner| self.targets.get_mut(&owner)) {
            pending.draw_ops.retain(|k| *k != key);
        }
        Some(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::draw_op::{DrawPathArgs, Shape};
    use crate::processor::Paint;
    use covpath_paint::{IRect, Path, Rect, Transform};

    fn op() -> DrawPathsOp {
        let path = Path::rect(Rect::new(0.0, 0.0, 10.0, 10.0)).with_volatile(true);
        DrawPathsOp::new(
            DrawPathArgs {
                shape: Shape::fill(path),
                view_matrix: Transform::IDENTITY,
                clip_ibounds: IRect::from_wh(100, 100),
                paint: Paint::default(),
            },
            &RendererConfig::default(),
        )
    }

    fn recorded_op(registry: &mut PendingPathsRegistry, owner: OpListId) -> DrawOpKey {
        let key = registry.insert_op(op());
        if let Some(op) = registry.op_mut(key) {
            op.recorded(owner);
        }
        registry.link(owner, key);
        key
    }

    #[test]
    fn test_lookup_or_create_is_idempotent() {
        let mut registry = PendingPathsRegistry::new();
        assert!(registry.is_empty());
        registry.lookup_or_create(OpListId(3));
        registry.lookup_or_create(OpListId(3));
        assert_eq!(registry.target_count(), 1);
        // An entry with nothing in it is still empty
        assert!(registry.is_empty());
    }

    #[test]
    fn test_erase_frees_owned_ops() {
        let mut registry = PendingPathsRegistry::new();
        let a = recorded_op(&mut registry, OpListId(1));
        let b = recorded_op(&mut registry, OpListId(1));
        let other = recorded_op(&mut registry, OpListId(2));
        assert!(!registry.is_empty());

        assert_eq!(registry.erase(OpListId(1)), 2);
        assert!(registry.op(a).is_none());
        assert!(registry.op(b).is_none());
        assert!(registry.op(other).is_some());
        assert!(!registry.contains(OpListId(1)));
        assert_eq!(registry.erase(OpListId(1)), 0);
    }

    #[test]
    fn test_remove_op_unlinks_owner() {
        let mut registry = PendingPathsRegistry::new();
        let a = recorded_op(&mut registry, OpListId(1));
        let b = recorded_op(&mut registry, OpListId(1));

        assert!(registry.remove_op(a).is_some());
        assert_eq!(registry.get(OpListId(1)).unwrap().draw_ops(), &[b]);
        assert!(registry.remove_op(a).is_none());
        assert_eq!(registry.op_count(), 1);
    }
}
