use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::pipeline::{SourceUnit, UnitInput};

#[derive(Default, Clone)]
#[salsa::db]
pub struct SettleDatabaseImpl {
    storage: salsa::Storage<Self>,
    units: Arc<DashMap<String, SourceUnit>>,
}

#[salsa::db]
impl salsa::Database for SettleDatabaseImpl {}

impl SettleDatabaseImpl {
    /// Register a unit under its generated file name, replacing any unit
    /// previously opened under that name.
    pub fn open_unit(&self, input: UnitInput) -> SourceUnit {
        let unit = input.create(self);
        let key = unit.generated_name(self).clone();
        self.units.insert(key, unit);
        unit
    }

    /// Register a unit unless one is already open under the same name.
    pub fn open_unit_once(&self, input: UnitInput) -> SourceUnit {
        let unit = input.create(self);
        match self.units.entry(unit.generated_name(self).clone()) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => *entry.insert(unit),
        }
    }

    pub fn close_unit(&self, generated_name: &str) {
        self.units.remove(generated_name);
    }

    pub fn unit(&self, generated_name: &str) -> Option<SourceUnit> {
        self.units.get(generated_name).map(|entry| *entry)
    }

    pub fn unit_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.units.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use settle_ast::build::*;

    use super::*;

    #[test]
    fn test_units_are_keyed_by_generated_name() {
        let db = SettleDatabaseImpl::default();
        let first = db.open_unit(UnitInput::new(program(vec![])));
        let other = db.open_unit(UnitInput::new(program(vec![])).names("lib.lua", "lib.ts"));

        assert_eq!(db.unit("main.lua"), Some(first));
        assert_eq!(db.unit("lib.lua"), Some(other));
        assert_eq!(db.unit_names(), vec!["lib.lua", "main.lua"]);

        let kept = db.open_unit_once(UnitInput::new(program(vec![])));
        assert_eq!(kept, first);

        db.close_unit("main.lua");
        assert_eq!(db.unit("main.lua"), None);
    }
}
