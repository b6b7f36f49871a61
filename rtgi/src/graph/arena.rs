use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use derivative::Derivative;

/// Which arena a resource lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArenaKind {
    /// Recreated every frame, owned by the [`super::FrameGraph`].
    Transient,

    /// Long-lived, owned by the per-view state and handed from one frame to
    /// the next.
    History,
}

/// Typed reference to a resource stored in an [`Arena`].
///
/// Handles are invalidated (go "stale") when their slot gets removed or the
/// arena gets cleared; accessing a stale handle yields `None`.
#[derive(Derivative)]
#[derivative(
    Clone(bound = ""),
    Copy(bound = ""),
    PartialEq(bound = ""),
    Eq(bound = ""),
    Hash(bound = "")
)]
pub struct Handle<T> {
    index: u32,
    generation: u32,
    arena: ArenaKind,
    #[derivative(PartialEq = "ignore", Hash = "ignore")]
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub fn arena(&self) -> ArenaKind {
        self.arena
    }

    /// Type-erased identity of this handle.
    pub fn id(&self) -> ResourceId {
        ResourceId {
            index: self.index,
            generation: self.generation,
            arena: self.arena,
        }
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}@{}", self.arena, self.index, self.generation)
    }
}

/// [`Handle`] without its type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId {
    index: u32,
    generation: u32,
    arena: ArenaKind,
}

impl ResourceId {
    pub fn arena(&self) -> ArenaKind {
        self.arena
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
struct Slot {
    generation: u32,

    #[derivative(Debug = "ignore")]
    value: Option<RefCell<Box<dyn Any>>>,
}

/// Slot vector with generation counters and a free list.
#[derive(Debug)]
pub struct Arena {
    kind: ArenaKind,
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Arena {
    pub fn new(kind: ArenaKind) -> Self {
        Self {
            kind,
            slots: Default::default(),
            free: Default::default(),
        }
    }

    pub fn kind(&self) -> ArenaKind {
        self.kind
    }

    pub fn insert<T>(&mut self, value: T) -> Handle<T>
    where
        T: Any,
    {
        let value = Some(RefCell::new(Box::new(value) as Box<dyn Any>));

        let index = if let Some(index) = self.free.pop() {
            self.slots[index as usize].value = value;
            index
        } else {
            self.slots.push(Slot {
                generation: 0,
                value,
            });

            (self.slots.len() - 1) as u32
        };

        Handle {
            index,
            generation: self.slots[index as usize].generation,
            arena: self.kind,
            _marker: PhantomData,
        }
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.slot(id).is_some()
    }

    /// # Panics
    ///
    /// Panics when the resource is already borrowed mutably.
    pub fn get<T>(&self, handle: Handle<T>) -> Option<Ref<'_, T>>
    where
        T: Any,
    {
        let cell = self.slot(handle.id())?;

        Ref::filter_map(cell.borrow(), |value| value.downcast_ref::<T>()).ok()
    }

    /// # Panics
    ///
    /// Panics when the resource is already borrowed.
    pub fn get_mut<T>(&self, handle: Handle<T>) -> Option<RefMut<'_, T>>
    where
        T: Any,
    {
        let cell = self.slot(handle.id())?;

        RefMut::filter_map(cell.borrow_mut(), |value| value.downcast_mut::<T>())
            .ok()
    }

    pub fn remove<T>(&mut self, handle: Handle<T>) -> Option<T>
    where
        T: Any,
    {
        self.slot(handle.id())?;

        let slot = &mut self.slots[handle.index as usize];
        let value = slot.value.take()?.into_inner();

        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);

        value.downcast::<T>().ok().map(|value| *value)
    }

    /// Removes all resources; every outstanding handle goes stale.
    pub fn clear(&mut self) {
        self.free.clear();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.value = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: ResourceId) -> Option<&RefCell<Box<dyn Any>>> {
        if id.arena != self.kind {
            return None;
        }

        let slot = self.slots.get(id.index as usize)?;

        if slot.generation != id.generation {
            return None;
        }

        slot.value.as_ref()
    }
}

/// Arena of resources which outlive a single frame (reservoir history, probe
/// textures, the surfel pool).
#[derive(Debug)]
pub struct HistoryArena {
    arena: Arena,
}

impl Default for HistoryArena {
    fn default() -> Self {
        Self {
            arena: Arena::new(ArenaKind::History),
        }
    }
}

impl Deref for HistoryArena {
    type Target = Arena;

    fn deref(&self) -> &Self::Target {
        &self.arena
    }
}

impl DerefMut for HistoryArena {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.arena
    }
}
