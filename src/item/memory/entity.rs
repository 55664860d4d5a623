use std::{
    cell::{Ref, RefCell, RefMut},
    fmt,
    rc::Rc,
};

/// Row type stored in a [`MemoryDatabase`](super::MemoryDatabase): a parent
/// row plus the child collections hanging off it.
pub trait Aggregate: Clone + 'static {
    fn id(&self) -> i64;

    /// Called on insert with the generated identity.
    fn assign_id(&mut self, id: i64);

    /// Names of the child collections, in the order they are lazily loaded.
    fn collections() -> &'static [&'static str] {
        &[]
    }

    /// Copy of the parent columns only, every collection left empty.
    fn without_collections(&self) -> Self {
        self.clone()
    }

    /// Fills collection `name` from the stored row `source`.
    fn load_collection(&mut self, _name: &str, _source: &Self) {}
}

/// Handle on an entity tracked by a session.
///
/// Clones share the same instance: while the session tracks the row, every
/// fetch of it returns a handle on this instance. Changes made through a
/// handle stay in memory and never reach the stored row.
pub struct Managed<T>(Rc<RefCell<T>>);

impl<T> Managed<T> {
    pub fn new(entity: T) -> Self {
        Self(Rc::new(RefCell::new(entity)))
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// Whether both handles point to the same instance.
    pub fn ptr_eq(&self, other: &Managed<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone> Managed<T> {
    /// Owned copy of the current state.
    pub fn snapshot(&self) -> T {
        self.0.borrow().clone()
    }
}

impl<T> Clone for Managed<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Managed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Managed").field(&*self.0.borrow()).finish()
    }
}

impl<T: PartialEq> PartialEq for Managed<T> {
    fn eq(&self, other: &Self) -> bool {
        *self.0.borrow() == *other.0.borrow()
    }
}
