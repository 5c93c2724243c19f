use serde::{Deserialize, Serialize};

/// Handle into an [`Arena`], tagged with the slot generation so a handle
/// survives neither removal nor an arena reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct AssetId {
    pub index: u32,
    pub generation: u32,
}

impl AssetId {
    pub const NULL: Self = Self {
        index: u32::MAX,
        generation: 0,
    };

    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn is_null(&self) -> bool {
        self.index == u32::MAX
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::NULL
    }
}

/// Generational arena holding assets registered with the solver.
///
/// `clear` bumps every live slot's generation, so ids handed out before a
/// reset resolve to `None` afterwards.
#[derive(Debug)]
pub struct Arena<T> {
    items: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
        }
    }

    pub fn insert(&mut self, item: T) -> AssetId {
        if let Some(index) = self.free_list.pop() {
            let slot = index as usize;
            self.items[slot] = Some(item);
            return AssetId::new(index, self.generations[slot]);
        }

        let index = self.items.len() as u32;
        self.items.push(Some(item));
        self.generations.push(0);
        AssetId::new(index, 0)
    }

    pub fn get(&self, id: AssetId) -> Option<&T> {
        if !self.is_valid(id) {
            return None;
        }
        self.items.get(id.index as usize).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, id: AssetId) -> Option<&mut T> {
        if !self.is_valid(id) {
            return None;
        }
        self.items
            .get_mut(id.index as usize)
            .and_then(|slot| slot.as_mut())
    }

    pub fn remove(&mut self, id: AssetId) -> Option<T> {
        if !self.is_valid(id) {
            return None;
        }
        let slot = id.index as usize;
        let item = self.items[slot].take();
        if item.is_some() {
            self.generations[slot] = self.generations[slot].wrapping_add(1);
            self.free_list.push(id.index);
        }
        item
    }

    /// Drops every asset and invalidates all outstanding ids.
    pub fn clear(&mut self) {
        self.free_list.clear();
        for (index, slot) in self.items.iter_mut().enumerate() {
            if slot.take().is_some() {
                self.generations[index] = self.generations[index].wrapping_add(1);
            }
            self.free_list.push(index as u32);
        }
        // lowest slots get reused first
        self.free_list.reverse();
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetId, &T)> + '_ {
        self.items.iter().enumerate().filter_map(move |(index, slot)| {
            slot.as_ref()
                .map(|item| (AssetId::new(index as u32, self.generations[index]), item))
        })
    }

    pub fn len(&self) -> usize {
        self.items.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_valid(&self, id: AssetId) -> bool {
        self.generations
            .get(id.index as usize)
            .is_some_and(|&generation| generation == id.generation)
    }
}
