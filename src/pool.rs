//! Holder pool for self-referential beans
//!
//! Generating a bean value needs a `Holder` for the bean's model. When the
//! bean contains a field of its own type, the nested generation needs a
//! second holder while the first is still in use. The pool keeps a LIFO
//! free list per type: a generation pops a holder (allocating one if the
//! list is empty), builds one value and pushes the holder back. Because
//! generations nest strictly, no two in-flight generations share a holder,
//! and allocation is bounded by the deepest nesting rather than the number
//! of nodes generated.

use std::collections::HashMap;
use std::sync::Arc;

use log::trace;

use crate::holder::Holder;
use crate::model::BeanDescription;
use crate::value::ValueType;

#[derive(Default)]
pub struct HolderPool {
    free: HashMap<ValueType, Vec<Holder>>,
    allocated: HashMap<ValueType, usize>,
}

impl HolderPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, description: &Arc<BeanDescription>) -> Holder {
        let bean_type = description.bean_type();
        if let Some(holder) = self.free.get_mut(&bean_type).and_then(|free| free.pop()) {
            return holder;
        }
        let count = self.allocated.entry(bean_type).or_insert(0);
        *count += 1;
        trace!("allocating holder #{} for {}", count, description.name());
        Holder::new(Arc::clone(description))
    }

    pub fn release(&mut self, holder: Holder) {
        self.free
            .entry(holder.bean_type())
            .or_insert_with(Vec::new)
            .push(holder);
    }

    pub fn allocated(&self, bean_type: ValueType) -> usize {
        self.allocated.get(&bean_type).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.free.clear();
        self.allocated.clear();
    }
}
