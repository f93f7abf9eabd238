//! Set of available cells with O(1) insert, remove and uniform pick.
use rand::Rng;

const ABSENT: usize = usize::MAX;

#[derive(Debug, Clone)]
pub struct CellPool {
    cells: Vec<usize>,
    /// `position[cell]` is the slot of `cell` in `cells`, or `ABSENT`.
    position: Vec<usize>,
}

impl CellPool {
    /// Empty pool over cell indices `0..nb_cells`.
    pub fn new(nb_cells: usize) -> Self {
        Self { cells: Vec::new(), position: vec![ABSENT; nb_cells] }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn contains(&self, cell: usize) -> bool {
        self.position[cell] != ABSENT
    }

    pub fn insert(&mut self, cell: usize) -> bool {
        if self.contains(cell) {
            return false;
        }
        self.position[cell] = self.cells.len();
        self.cells.push(cell);
        true
    }

    /// Swap-remove: the last cell takes the freed slot.
    pub fn remove(&mut self, cell: usize) -> bool {
        let slot = self.position[cell];
        if slot == ABSENT {
            return false;
        }
        self.cells.swap_remove(slot);
        if let Some(&moved) = self.cells.get(slot) {
            self.position[moved] = slot;
        }
        self.position[cell] = ABSENT;
        true
    }

    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(self.cells[rng.gen_range(0..self.cells.len())])
        }
    }

    pub fn clear(&mut self) {
        for &c in &self.cells {
            self.position[c] = ABSENT;
        }
        self.cells.clear();
    }
}
