//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use mockall::mock;

use store_batch_rs::{
    item::memory::MemoryDatabase,
    store::{seed_stores, FaultInjector, Store, StoreSeed},
    BatchError,
};

mock! {
    pub Faults {}
    impl FaultInjector for Faults {
        fn check(&self, item_number: usize) -> Result<(), BatchError>;
    }
}

pub const SEOUL: &str = "서울 강남구";
pub const BUSAN: &str = "부산 해운대구";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Database holding `stores` Seoul stores with two products and two employees
/// each.
pub fn seoul_stores(stores: usize) -> MemoryDatabase<Store> {
    let database = MemoryDatabase::new();
    seed_stores(&database, &StoreSeed::new(stores, SEOUL));
    database
}
