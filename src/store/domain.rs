use time::Date;

use crate::item::memory::Aggregate;

pub const PRODUCTS: &str = "products";
pub const EMPLOYEES: &str = "employees";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub name: String,
    pub price: i64,
}

impl Product {
    pub fn new(name: &str, price: i64) -> Self {
        Self {
            name: name.to_string(),
            price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    pub name: String,
    pub hire_date: Date,
}

impl Employee {
    pub fn new(name: &str, hire_date: Date) -> Self {
        Self {
            name: name.to_string(),
            hire_date,
        }
    }
}

/// A store with the products it sells and the people it employs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    /// Generated on insert, 0 before
    pub id: i64,
    pub name: String,
    pub address: String,
    pub products: Vec<Product>,
    pub employees: Vec<Employee>,
}

impl Store {
    pub fn new(name: &str, address: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            address: address.to_string(),
            products: Vec::new(),
            employees: Vec::new(),
        }
    }

    pub fn add_product(&mut self, product: Product) {
        self.products.push(product);
    }

    pub fn add_employee(&mut self, employee: Employee) {
        self.employees.push(employee);
    }

    pub fn with_product(mut self, product: Product) -> Self {
        self.add_product(product);
        self
    }

    pub fn with_employee(mut self, employee: Employee) -> Self {
        self.add_employee(employee);
        self
    }
}

impl Aggregate for Store {
    fn id(&self) -> i64 {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = id;
    }

    fn collections() -> &'static [&'static str] {
        &[PRODUCTS, EMPLOYEES]
    }

    fn without_collections(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            address: self.address.clone(),
            products: Vec::new(),
            employees: Vec::new(),
        }
    }

    fn load_collection(&mut self, name: &str, source: &Self) {
        match name {
            PRODUCTS => self.products = source.products.clone(),
            EMPLOYEES => self.employees = source.employees.clone(),
            _ => {}
        }
    }
}

/// Snapshot of a store: its name and the comma separated names of its
/// products and employees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHistory {
    pub store_name: String,
    pub product_names: String,
    pub employee_names: String,
}

impl From<&Store> for StoreHistory {
    fn from(store: &Store) -> Self {
        Self {
            store_name: store.name.clone(),
            product_names: join_names(store.products.iter().map(|product| product.name.as_str())),
            employee_names: join_names(
                store.employees.iter().map(|employee| employee.name.as_str()),
            ),
        }
    }
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(",")
}
