use log::info;
use time::{macros::date, Date, Duration};

use crate::{
    core::{
        step::StepExecution,
        tasklet::{RepeatStatus, Tasklet},
    },
    error::BatchError,
    item::memory::MemoryDatabase,
};

use super::domain::{Employee, Product, Store};

const FIRST_HIRE_DATE: Date = date!(2020 - 01 - 01);

/// Shape of the generated test data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSeed {
    pub stores: usize,
    pub products_per_store: usize,
    pub employees_per_store: usize,
    /// Address of every generated store
    pub address: String,
}

impl StoreSeed {
    pub fn new(stores: usize, address: &str) -> Self {
        Self {
            stores,
            products_per_store: 2,
            employees_per_store: 2,
            address: address.to_string(),
        }
    }
}

/// Inserts `seed.stores` stores with their products and employees and returns
/// their ids.
pub fn seed_stores(database: &MemoryDatabase<Store>, seed: &StoreSeed) -> Vec<i64> {
    (0..seed.stores)
        .map(|i| {
            let mut store = Store::new(&format!("store{i}"), &seed.address);
            for p in 0..seed.products_per_store {
                store.add_product(Product::new(&product_name(i, p), 1000 * (p as i64 + 1)));
            }
            for e in 0..seed.employees_per_store {
                let hire_date = FIRST_HIRE_DATE
                    .checked_add(Duration::days(e as i64))
                    .unwrap_or(FIRST_HIRE_DATE);
                store.add_employee(Employee::new(&employee_name(i, e), hire_date));
            }
            database.insert(store)
        })
        .collect()
}

#[cfg(not(feature = "fake"))]
fn product_name(store: usize, product: usize) -> String {
    format!("product{store}-{product}")
}

#[cfg(not(feature = "fake"))]
fn employee_name(store: usize, employee: usize) -> String {
    format!("employee{store}-{employee}")
}

#[cfg(feature = "fake")]
fn product_name(_store: usize, _product: usize) -> String {
    use fake::{faker::lorem::en::Word, Fake};
    Word().fake()
}

#[cfg(feature = "fake")]
fn employee_name(_store: usize, _employee: usize) -> String {
    use fake::{faker::name::en::Name, Fake};
    Name().fake()
}

/// Tasklet filling the store table before the chunk step runs.
pub struct SeedStoresTasklet<'a> {
    database: &'a MemoryDatabase<Store>,
    seed: StoreSeed,
}

impl<'a> SeedStoresTasklet<'a> {
    pub fn new(database: &'a MemoryDatabase<Store>, seed: StoreSeed) -> Self {
        Self { database, seed }
    }
}

impl Tasklet for SeedStoresTasklet<'_> {
    fn execute(&self, step_execution: &StepExecution) -> Result<RepeatStatus, BatchError> {
        let ids = seed_stores(self.database, &self.seed);
        info!(
            "Step {} inserted {} stores at {}",
            step_execution.name,
            ids.len(),
            self.seed.address
        );
        Ok(RepeatStatus::Finished)
    }
}
