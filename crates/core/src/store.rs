//! Dense point storage shared by the brute-force and graph indexes.
//!
//! Vectors live in one contiguous `Vec<f32>` addressed by internal id. A slot
//! is unused (id >= len), live, or soft-deleted. Labels map 1:1 onto occupied
//! slots, including soft-deleted ones, until a replace-deleted insert takes the
//! slot over.

use crate::error::{IndexError, IndexResult};
use crate::types::{InternalId, Label};
use std::collections::{BTreeSet, HashMap};

/// Where [`PointStore::insert`] put a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// A previously unused slot at the end of the arena.
    Appended(InternalId),
    /// A soft-deleted slot that was overwritten and revived.
    Replaced(InternalId),
}

impl Placement {
    pub fn id(&self) -> InternalId {
        match *self {
            Placement::Appended(id) | Placement::Replaced(id) => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PointStore {
    dim: usize,
    capacity: usize,
    reserved: bool,
    data: Vec<f32>,
    labels: Vec<Label>,
    deleted: Vec<bool>,
    deleted_ids: BTreeSet<InternalId>,
    lookup: HashMap<Label, InternalId>,
}

impl PointStore {
    /// An unreserved store. Every mutation fails with `NotInitialized` until
    /// [`reserve`](Self::reserve) is called.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            capacity: 0,
            reserved: false,
            data: Vec::new(),
            labels: Vec::new(),
            deleted: Vec::new(),
            deleted_ids: BTreeSet::new(),
            lookup: HashMap::new(),
        }
    }

    pub fn with_capacity(dim: usize, capacity: usize) -> Self {
        let mut store = Self::new(dim);
        store.reserve(capacity);
        store
    }

    /// Drop all contents and set the capacity to `capacity` slots.
    ///
    /// Memory is claimed as points arrive, so `capacity` is only an upper
    /// bound on the element count.
    pub fn reserve(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.reserved = true;
        self.data = Vec::new();
        self.labels = Vec::new();
        self.deleted = Vec::new();
        self.deleted_ids.clear();
        self.lookup = HashMap::new();
    }

    /// Grow capacity in place. Ids and contents are untouched.
    pub fn resize(&mut self, new_capacity: usize) -> IndexResult<()> {
        self.ensure_reserved()?;
        if new_capacity < self.capacity {
            return Err(IndexError::InvalidArgument(format!(
                "cannot shrink capacity from {} to {}",
                self.capacity, new_capacity
            )));
        }
        self.capacity = new_capacity;
        Ok(())
    }

    /// Store `vector` under `label`.
    ///
    /// With `replace_deleted`, a soft-deleted slot is preferred over an unused
    /// one: the label's own slot when that label is soft-deleted, otherwise
    /// the lowest deleted id, whose old label is forgotten.
    pub fn insert(
        &mut self,
        label: Label,
        vector: &[f32],
        replace_deleted: bool,
    ) -> IndexResult<Placement> {
        self.ensure_reserved()?;
        self.check_dimension(vector)?;

        if let Some(&id) = self.lookup.get(&label) {
            if replace_deleted && self.deleted[id as usize] {
                self.overwrite(id, vector);
                self.revive(id);
                return Ok(Placement::Replaced(id));
            }
            return Err(IndexError::DuplicateLabel(label));
        }

        if replace_deleted {
            if let Some(&id) = self.deleted_ids.iter().next() {
                let old_label = self.labels[id as usize];
                self.lookup.remove(&old_label);
                self.lookup.insert(label, id);
                self.labels[id as usize] = label;
                self.overwrite(id, vector);
                self.revive(id);
                return Ok(Placement::Replaced(id));
            }
        }

        if self.labels.len() >= self.capacity {
            return Err(IndexError::CapacityExceeded {
                max_elements: self.capacity,
            });
        }
        let id = self.labels.len() as InternalId;
        self.data.extend_from_slice(vector);
        self.labels.push(label);
        self.deleted.push(false);
        self.lookup.insert(label, id);
        Ok(Placement::Appended(id))
    }

    /// Mark a live label deleted, keeping its slot.
    pub fn soft_delete(&mut self, label: Label) -> IndexResult<InternalId> {
        self.ensure_reserved()?;
        match self.lookup.get(&label) {
            Some(&id) if !self.deleted[id as usize] => {
                self.deleted[id as usize] = true;
                self.deleted_ids.insert(id);
                Ok(id)
            }
            _ => Err(IndexError::LabelNotFound(label)),
        }
    }

    /// Revive a soft-deleted label.
    pub fn undelete(&mut self, label: Label) -> IndexResult<InternalId> {
        self.ensure_reserved()?;
        match self.lookup.get(&label) {
            Some(&id) if self.deleted[id as usize] => {
                self.revive(id);
                Ok(id)
            }
            _ => Err(IndexError::LabelNotFound(label)),
        }
    }

    /// Hard-delete `label`, moving the last slot into the freed one.
    ///
    /// Returns `(freed_id, moved_from)` where `moved_from` is the id that was
    /// relocated, if any.
    pub fn swap_remove(&mut self, label: Label) -> IndexResult<(InternalId, Option<InternalId>)> {
        self.ensure_reserved()?;
        let id = self
            .lookup
            .remove(&label)
            .ok_or(IndexError::LabelNotFound(label))?;
        let last = (self.labels.len() - 1) as InternalId;
        self.deleted_ids.remove(&id);

        if id != last {
            let (i, l) = (id as usize, last as usize);
            let (head, tail) = self.data.split_at_mut(l * self.dim);
            head[i * self.dim..(i + 1) * self.dim].copy_from_slice(&tail[..self.dim]);
            self.labels[i] = self.labels[l];
            self.deleted[i] = self.deleted[l];
            if self.deleted_ids.remove(&last) {
                self.deleted_ids.insert(id);
            }
            self.lookup.insert(self.labels[i], id);
        }

        self.data.truncate(last as usize * self.dim);
        self.labels.pop();
        self.deleted.pop();
        Ok((id, (id != last).then_some(last)))
    }

    /// The stored vector of a live label.
    pub fn get(&self, label: Label) -> IndexResult<&[f32]> {
        self.ensure_reserved()?;
        match self.lookup.get(&label) {
            Some(&id) if !self.deleted[id as usize] => Ok(self.vector(id)),
            _ => Err(IndexError::LabelNotFound(label)),
        }
    }

    /// `n` labels for an auto-labelled batch. With `replace_deleted` the
    /// soft-deleted labels come first, ascending; the rest continue from the
    /// largest label ever assigned.
    pub fn generate_labels(&self, n: usize, replace_deleted: bool) -> IndexResult<Vec<Label>> {
        let mut out = Vec::with_capacity(n);
        if replace_deleted {
            out.extend(self.deleted_labels().into_iter().take(n));
        }
        let mut next = match self.lookup.keys().max() {
            Some(&max) => max as u64 + 1,
            None => 0,
        };
        while out.len() < n {
            let label = Label::try_from(next).map_err(|_| {
                IndexError::InvalidArgument("no free labels left to assign".into())
            })?;
            out.push(label);
            next += 1;
        }
        Ok(out)
    }

    /// Live labels, ascending.
    pub fn used_labels(&self) -> Vec<Label> {
        let mut labels: Vec<Label> = self
            .labels
            .iter()
            .zip(&self.deleted)
            .filter(|(_, &d)| !d)
            .map(|(&l, _)| l)
            .collect();
        labels.sort_unstable();
        labels
    }

    /// Soft-deleted labels, ascending.
    pub fn deleted_labels(&self) -> Vec<Label> {
        let mut labels: Vec<Label> = self
            .deleted_ids
            .iter()
            .map(|&id| self.labels[id as usize])
            .collect();
        labels.sort_unstable();
        labels
    }

    /// Iterate live slots as `(id, label, vector)`.
    pub fn iter_live(&self) -> impl Iterator<Item = (InternalId, Label, &[f32])> + '_ {
        (0..self.labels.len())
            .filter(move |&i| !self.deleted[i])
            .map(move |i| (i as InternalId, self.labels[i], self.vector(i as InternalId)))
    }

    #[inline]
    pub fn vector(&self, id: InternalId) -> &[f32] {
        let start = id as usize * self.dim;
        &self.data[start..start + self.dim]
    }

    #[inline]
    pub fn label(&self, id: InternalId) -> Label {
        self.labels[id as usize]
    }

    #[inline]
    pub fn is_deleted(&self, id: InternalId) -> bool {
        self.deleted[id as usize]
    }

    pub fn internal_id(&self, label: Label) -> Option<InternalId> {
        self.lookup.get(&label).copied()
    }

    /// Occupied slots, soft-deleted ones included.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.labels.len() - self.deleted_ids.len()
    }

    /// Maximum number of occupied slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Vector dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_reserved(&self) -> bool {
        self.reserved
    }

    /// Rebuild a store from decoded parts, validating every invariant.
    pub fn from_parts(
        dim: usize,
        capacity: usize,
        labels: Vec<Label>,
        data: Vec<f32>,
        deleted: Vec<bool>,
    ) -> IndexResult<Self> {
        let count = labels.len();
        if count > capacity {
            return Err(IndexError::CorruptData(format!(
                "element count {} exceeds capacity {}",
                count, capacity
            )));
        }
        if data.len() != count * dim || deleted.len() != count {
            return Err(IndexError::CorruptData(
                "vector or deletion data does not match element count".into(),
            ));
        }
        let mut lookup = HashMap::with_capacity(count);
        for (id, &label) in labels.iter().enumerate() {
            if lookup.insert(label, id as InternalId).is_some() {
                return Err(IndexError::CorruptData(format!(
                    "label {} stored twice",
                    label
                )));
            }
        }
        let deleted_ids = deleted
            .iter()
            .enumerate()
            .filter(|(_, &d)| d)
            .map(|(id, _)| id as InternalId)
            .collect();
        Ok(Self {
            dim,
            capacity,
            reserved: true,
            data,
            labels,
            deleted,
            deleted_ids,
            lookup,
        })
    }

    fn ensure_reserved(&self) -> IndexResult<()> {
        if !self.reserved {
            return Err(IndexError::NotInitialized);
        }
        Ok(())
    }

    fn check_dimension(&self, v: &[f32]) -> IndexResult<()> {
        if v.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: v.len(),
            });
        }
        Ok(())
    }

    fn overwrite(&mut self, id: InternalId, vector: &[f32]) {
        let start = id as usize * self.dim;
        self.data[start..start + self.dim].copy_from_slice(vector);
    }

    fn revive(&mut self, id: InternalId) {
        self.deleted[id as usize] = false;
        self.deleted_ids.remove(&id);
    }
}
