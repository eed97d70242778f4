//! Request-scoped memoisation.
//!
//! A [`RequestContext`] lives for one logical request. Repeated lookups of the
//! same person through [`PersonRepository::get_in`] share one store round-trip
//! for as long as the context lives. Writes made through the repository do
//! not refresh the memo.
//!
//! [`PersonRepository::get_in`]: crate::PersonRepository::get_in

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::person::Person;

type PersonCell = Arc<OnceCell<Option<Person>>>;

#[derive(Debug, Default)]
pub struct RequestContext {
  people: Mutex<HashMap<Uuid, PersonCell>>,
}

impl RequestContext {
  pub fn new() -> Self { Self::default() }

  /// The memo cell for `id`, created empty on first use.
  ///
  /// Concurrent callers receive the same cell, so an in-flight lookup is
  /// awaited rather than repeated.
  pub(crate) fn person_cell(&self, id: Uuid) -> PersonCell {
    let mut people = self.people.lock().unwrap_or_else(PoisonError::into_inner);
    people.entry(id).or_default().clone()
  }

  /// Number of people looked up through this context so far.
  pub fn memoized_people(&self) -> usize {
    let people = self.people.lock().unwrap_or_else(PoisonError::into_inner);
    people.values().filter(|cell| cell.initialized()).count()
  }
}
