use crate::{
    core::item::{ItemReader, ItemReaderResult},
    error::BatchError,
    item::source::PageSource,
};

use super::paging_reader::{
    ChildLoading, DEFAULT_PAGE_SIZE, PagingItemReader, PagingItemReaderBuilder, PagingMode,
};

/// Paging reader that fetches parents only and then loads every child
/// collection of every parent in a round trip of its own.
///
/// A page of `k` parents with `c` collections costs `1 + k * c` round trips
/// instead of one. This is the N+1 select pattern, kept to measure its cost
/// against [`PagingItemReader`]; do not use it for real jobs.
pub struct N1PagingItemReader<'a, T> {
    delegate: PagingItemReader<'a, T>,
}

impl<T> N1PagingItemReader<'_, T> {
    pub fn get_name(&self) -> &str {
        self.delegate.get_name()
    }

    /// Collections loaded one parent at a time so far.
    pub fn collection_loads(&self) -> usize {
        self.delegate.collection_loads()
    }
}

impl<T: Clone> ItemReader<T> for N1PagingItemReader<'_, T> {
    fn open(&self) -> Result<(), BatchError> {
        self.delegate.open()
    }

    fn read(&self) -> ItemReaderResult<T> {
        self.delegate.read()
    }

    fn jump_to_item(&self, item_index: usize) -> Result<(), BatchError> {
        self.delegate.jump_to_item(item_index)
    }

    fn update(&self) -> Result<(), BatchError> {
        self.delegate.update()
    }

    fn close(&self) -> Result<(), BatchError> {
        self.delegate.close()
    }
}

pub struct N1PagingItemReaderBuilder<'a, T> {
    name: Option<String>,
    source: Option<&'a dyn PageSource<T>>,
    page_size: usize,
    mode: PagingMode,
}

impl<T> Default for N1PagingItemReaderBuilder<'_, T> {
    fn default() -> Self {
        Self {
            name: None,
            source: None,
            page_size: DEFAULT_PAGE_SIZE,
            mode: PagingMode::Transacted,
        }
    }
}

impl<'a, T> N1PagingItemReaderBuilder<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn source(mut self, source: &'a dyn PageSource<T>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn mode(mut self, mode: PagingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Result<N1PagingItemReader<'a, T>, BatchError> {
        let mut builder = PagingItemReaderBuilder::new()
            .name(self.name.as_deref().unwrap_or("n1PagingItemReader"))
            .page_size(self.page_size)
            .mode(self.mode)
            .child_loading(ChildLoading::PerParent);
        if let Some(source) = self.source {
            builder = builder.source(source);
        }

        Ok(N1PagingItemReader {
            delegate: builder.build()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::memory::{Aggregate, Managed, MemoryDatabase};

    #[derive(Debug, Clone, PartialEq)]
    struct Team {
        id: i64,
        members: Vec<String>,
        coaches: Vec<String>,
    }

    impl Aggregate for Team {
        fn id(&self) -> i64 {
            self.id
        }

        fn assign_id(&mut self, id: i64) {
            self.id = id;
        }

        fn collections() -> &'static [&'static str] {
            &["members", "coaches"]
        }

        fn without_collections(&self) -> Self {
            Self {
                id: self.id,
                members: Vec::new(),
                coaches: Vec::new(),
            }
        }

        fn load_collection(&mut self, name: &str, source: &Self) {
            match name {
                "members" => self.members = source.members.clone(),
                "coaches" => self.coaches = source.coaches.clone(),
                _ => {}
            }
        }
    }

    fn database(teams: usize) -> MemoryDatabase<Team> {
        let database = MemoryDatabase::new();
        for i in 0..teams {
            database.insert(Team {
                id: 0,
                members: vec![format!("member{i}")],
                coaches: vec![format!("coach{i}")],
            });
        }
        database
    }

    #[test]
    fn loads_each_collection_of_each_parent_separately() {
        let database = database(4);
        let query = database.query();
        let reader = N1PagingItemReaderBuilder::<Managed<Team>>::new()
            .source(&query)
            .page_size(2)
            .build()
            .unwrap();

        reader.open().unwrap();
        let mut teams = Vec::new();
        while let Some(team) = reader.read().unwrap() {
            teams.push(team.snapshot());
        }

        assert_eq!(teams.len(), 4);
        assert_eq!(teams[3].members, vec!["member3"]);
        assert_eq!(teams[3].coaches, vec!["coach3"]);
        assert_eq!(reader.collection_loads(), 8);
        // 3 page queries (the last one empty) plus 2 loads per team
        assert_eq!(database.round_trips(), 3 + 8);
    }

    #[test]
    fn requires_a_source() {
        let result = N1PagingItemReaderBuilder::<Managed<Team>>::new().build();

        assert!(matches!(result, Err(BatchError::InvalidConfig(_))));
    }
}
