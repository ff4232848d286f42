//! Pre-sized storage for the stages and argument slots of a parsed line.
//!
//! Both arenas are created once per session and reused for every line. They grow to
//! exactly the size a line needs and never shrink. Records are addressed by index,
//! so growing (and relocating) an arena never invalidates a parsed structure.

use crate::lexer::{LineSize, Span};
use log::debug;
use thiserror::Error;

/// Initial number of stage records.
pub const INITIAL_STAGES: usize = 8;
/// Initial number of argument slots.
pub const INITIAL_ITEMS: usize = 32;

/// Index of a stage record inside the stage arena.
pub type StageId = usize;

/// One command of a pipeline.
///
/// Its arguments live in the item arena at `items..items + length`, followed by a
/// `None` terminator slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stage {
    /// First argument slot of this stage.
    pub items: usize,
    /// Number of real arguments, the terminator excluded.
    pub length: usize,
    /// Zero-based position in the pipeline.
    pub depth: usize,
    /// The stage immediately before this one in the text.
    pub prev: Option<StageId>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArenaError {
    #[error("could not grow buffers to {stages} stages and {items} items")]
    Alloc { stages: usize, items: usize },
    #[error("argument slot {0} is outside the item buffer")]
    ItemOverflow(usize),
    #[error("stage {0} is outside the command buffer")]
    StageOverflow(StageId),
}

/// The two growable buffers shared by every parse of a session.
#[derive(Debug)]
pub struct Arena {
    stages: Vec<Stage>,
    items: Vec<Option<Span>>,
}

impl Arena {
    /// Allocates the arenas at their initial sizes.
    pub fn new() -> Result<Self, ArenaError> {
        Self::with_capacity(INITIAL_STAGES, INITIAL_ITEMS)
    }

    pub fn with_capacity(stages: usize, items: usize) -> Result<Self, ArenaError> {
        let mut arena = Arena {
            stages: Vec::new(),
            items: Vec::new(),
        };
        arena.ensure_capacity(stages, items)?;
        Ok(arena)
    }

    /// Number of stage records the arena can hold.
    pub fn stage_capacity(&self) -> usize {
        self.stages.len()
    }

    /// Number of argument slots the arena can hold.
    pub fn item_capacity(&self) -> usize {
        self.items.len()
    }

    /// Grows each arena to exactly the requested size if it is currently smaller.
    ///
    /// On failure neither arena is modified.
    pub fn ensure_capacity(&mut self, stages: usize, items: usize) -> Result<(), ArenaError> {
        let more_stages = stages.saturating_sub(self.stages.len());
        let more_items = items.saturating_sub(self.items.len());
        if more_stages == 0 && more_items == 0 {
            return Ok(());
        }

        let alloc_error = |_| ArenaError::Alloc { stages, items };
        self.stages.try_reserve_exact(more_stages).map_err(alloc_error)?;
        self.items.try_reserve_exact(more_items).map_err(alloc_error)?;

        // Capacity is reserved, so neither resize can reallocate.
        self.stages.resize(self.stages.len() + more_stages, Stage::default());
        self.items.resize(self.items.len() + more_items, None);
        debug!(
            "arena grown to {} stages, {} items",
            self.stages.len(),
            self.items.len()
        );
        Ok(())
    }

    /// Grows the arenas to fit a line of the given size.
    pub fn fit(&mut self, size: LineSize) -> Result<(), ArenaError> {
        self.ensure_capacity(stage_slots(size), item_slots(size))
    }

    pub fn stage(&self, id: StageId) -> Result<&Stage, ArenaError> {
        self.stages.get(id).ok_or(ArenaError::StageOverflow(id))
    }

    pub fn stage_mut(&mut self, id: StageId) -> Result<&mut Stage, ArenaError> {
        self.stages.get_mut(id).ok_or(ArenaError::StageOverflow(id))
    }

    pub fn set_item(&mut self, slot: usize, item: Option<Span>) -> Result<(), ArenaError> {
        let cell = self.items.get_mut(slot).ok_or(ArenaError::ItemOverflow(slot))?;
        *cell = item;
        Ok(())
    }

    /// Argument slots of `stage`, terminator excluded.
    pub fn args(&self, stage: &Stage) -> &[Option<Span>] {
        self.items
            .get(stage.items..stage.items + stage.length)
            .unwrap_or(&[])
    }

    /// The slot right after the last argument of `stage`.
    pub fn terminator(&self, stage: &Stage) -> Option<Option<Span>> {
        self.items.get(stage.items + stage.length).copied()
    }
}

/// Stage records needed for a line: one more than the number of pipes.
pub fn stage_slots(size: LineSize) -> usize {
    size.pipes + 1
}

/// Argument slots needed for a line: every word plus one terminator per stage.
pub fn item_slots(size: LineSize) -> usize {
    size.items + size.pipes + 1
}
