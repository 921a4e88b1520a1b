//! Resolution between block labels and the relative depths branches use on
//! the wire.

use std::ptr;

use super::error::{Error, Result};
use super::instructions::{Instr, Label};

/// How many blocks, counting the frame of the expression itself, may be open
/// at once in any traversal.
pub const MAX_NESTING: usize = 256;

/// The currently open blocks of one traversal, innermost last.
///
/// `T` is whatever the traversal needs to know about an open block, for
/// example the types a branch to it carries.
#[derive(Clone, Debug)]
pub struct BlockStack<T> {
    entries: Vec<(Label, T)>,
}

impl<T> Default for BlockStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockStack<T> {
    pub fn new() -> Self {
        BlockStack { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether another block may be opened without exceeding [`MAX_NESTING`].
    pub fn has_room(&self) -> bool {
        self.entries.len() < MAX_NESTING
    }

    /// Runs `f` with `label` pushed as the innermost block.
    ///
    /// See [`scoped`] for the guarantees.
    pub fn with_block<R, F>(&mut self, label: Label, data: T, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        scoped(self, label, data, f)
    }

    fn close(&mut self, depth: usize, label: Label) -> Result<()> {
        let matches = self.entries.len() == depth + 1
            && self.entries.last().map(|&(l, _)| l) == Some(label);
        self.entries.truncate(depth);
        if matches {
            Ok(())
        } else {
            Err(Error::structure(format!("block stack mismatch while closing {}", label)))
        }
    }

    /// Distance of `label` from the innermost block, 0 for the innermost.
    pub fn depth_of(&self, label: Label) -> Option<u32> {
        self.entries
            .iter()
            .rev()
            .position(|&(l, _)| l == label)
            .map(|d| d as u32)
    }

    /// The block `depth` levels out from the innermost one.
    pub fn get(&self, depth: u32) -> Option<(Label, &T)> {
        let len = self.entries.len();
        let d = depth as usize;
        if d < len {
            let (label, data) = &self.entries[len - 1 - d];
            Some((*label, data))
        } else {
            None
        }
    }

    /// Like `depth_of`, but fails for labels of blocks that are not open.
    pub fn resolve(&self, label: Label) -> Result<u32> {
        self.depth_of(label)
            .ok_or_else(|| Error::reference(format!("branch target {} is not an enclosing block", label)))
    }

    /// Like `get`, but fails for depths beyond the outermost block.
    pub fn lookup(&self, depth: u32) -> Result<(Label, &T)> {
        let len = self.entries.len();
        self.get(depth)
            .ok_or_else(|| Error::reference(format!("label {} out of range, {} block(s) open", depth, len)))
    }

    pub fn data(&self, label: Label) -> Option<&T> {
        self.entries.iter().rev().find(|&&(l, _)| l == label).map(|(_, t)| t)
    }
}

/// A traversal context that owns a block stack.
pub trait Blocks<T> {
    fn blocks(&mut self) -> &mut BlockStack<T>;
}

impl<T> Blocks<T> for BlockStack<T> {
    fn blocks(&mut self) -> &mut BlockStack<T> {
        self
    }
}

/// Runs `f` with `label` pushed as the innermost block of `cx`.
///
/// The entry is removed again on every exit path. If `f` left the stack in a
/// different shape, that is reported as an `InvalidStructure` error, unless
/// `f` itself already failed.
pub fn scoped<C, T, R, F>(cx: &mut C, label: Label, data: T, f: F) -> Result<R>
where
    C: Blocks<T> + ?Sized,
    F: FnOnce(&mut C) -> Result<R>,
{
    let depth = cx.blocks().entries.len();
    cx.blocks().entries.push((label, data));
    let result = f(cx);
    let closed = cx.blocks().close(depth, label);
    let value = result?;
    closed?;
    Ok(value)
}

/// What `relative_depth` does when the branch is not inside the block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Miss {
    Fail,
    /// Used while the branch is not attached to the tree yet.
    Tolerate,
}

/// The relative label a branch placed somewhere inside `block` uses to exit
/// `block`.
///
/// `branch` is matched by identity: 0 if it is a direct child of `block`,
/// `d + 1` if it sits at depth `d` inside one of `block`'s child blocks.
pub fn relative_depth(block: &Instr, branch: &Instr, miss: Miss) -> Result<Option<u32>> {
    match block.bodies() {
        None => Err(Error::structure(format!("`{}` does not open a block", block.name()))),
        Some((first, second)) => match search(first, second, branch) {
            Some(depth) => Ok(Some(depth)),
            None if miss == Miss::Tolerate => Ok(None),
            None => Err(Error::reference(format!(
                "`{}` is not nested inside the `{}` it exits",
                branch.name(),
                block.name()
            ))),
        },
    }
}

fn search(first: &[Instr], second: &[Instr], branch: &Instr) -> Option<u32> {
    if first.iter().chain(second).any(|child| ptr::eq(child, branch)) {
        return Some(0);
    }
    first.iter().chain(second).find_map(|child| {
        let (a, b) = child.bodies()?;
        search(a, b, branch).map(|d| d + 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::SimpleOp;
    use crate::types::BlockType;

    fn first(instr: &Instr) -> &Instr {
        &instr.bodies().unwrap().0[0]
    }

    #[test]
    fn nested_branch_depth() {
        let outer = Instr::block(BlockType::Empty, |outer| vec![Instr::block(BlockType::Empty, |_| vec![Instr::Br(outer)])]);
        let br = first(first(&outer));
        assert_eq!(relative_depth(&outer, br, Miss::Fail), Ok(Some(1)));
    }

    #[test]
    fn direct_branch_depth() {
        let block = Instr::block(BlockType::Empty, |l| vec![Instr::Br(l)]);
        assert_eq!(relative_depth(&block, first(&block), Miss::Fail), Ok(Some(0)));
    }

    #[test]
    fn else_arm_counts_as_direct_child() {
        let iff = Instr::if_else(BlockType::Empty, |_| vec![], |l| vec![Instr::Br(l)]);
        let br = &iff.bodies().unwrap().1[0];
        assert_eq!(relative_depth(&iff, br, Miss::Fail), Ok(Some(0)));
    }

    #[test]
    fn branch_outside_block() {
        let block = Instr::block(BlockType::Empty, |_| vec![Instr::Simple(SimpleOp::Nop)]);
        let stray = Instr::Br(Label::fresh());
        assert!(relative_depth(&block, &stray, Miss::Fail).is_err());
        assert_eq!(relative_depth(&block, &stray, Miss::Tolerate), Ok(None));
    }

    #[test]
    fn stack_resolves_both_ways() {
        let (a, b) = (Label::fresh(), Label::fresh());
        let mut stack = BlockStack::new();
        stack
            .with_block(a, (), |s| {
                s.with_block(b, (), |s| {
                    assert_eq!(s.resolve(a)?, 1);
                    assert_eq!(s.resolve(b)?, 0);
                    assert_eq!(s.lookup(1)?.0, a);
                    assert!(s.lookup(2).is_err());
                    Ok(())
                })
            })
            .unwrap();
        assert!(stack.is_empty());
        assert!(stack.resolve(a).is_err());
    }

    #[test]
    fn stack_is_restored_after_errors() {
        let mut stack = BlockStack::new();
        let r: Result<()> = stack.with_block(Label::fresh(), (), |_| Err(Error::structure("boom")));
        assert_eq!(r, Err(Error::structure("boom")));
        assert!(stack.is_empty());
    }

    #[test]
    fn room_runs_out_at_the_nesting_limit() {
        let mut stack = BlockStack::new();
        for _ in 0..MAX_NESTING - 1 {
            stack.entries.push((Label::fresh(), ()));
        }
        assert!(stack.has_room());
        stack.entries.push((Label::fresh(), ()));
        assert!(!stack.has_room());
    }

    #[test]
    fn unbalanced_body_is_reported() {
        let mut stack = BlockStack::new();
        let r = stack.with_block(Label::fresh(), (), |s| {
            s.entries.push((Label::fresh(), ()));
            Ok(())
        });
        assert!(r.is_err());
        assert!(stack.is_empty());
    }
}
