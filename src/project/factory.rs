use std::collections::BTreeMap;

use crate::component::Component;
use crate::error::{FlowError, Result};

type Constructor = Box<dyn Fn() -> Box<dyn Component>>;

/// Maps type names used in recorded commands to component constructors.
#[derive(Default)]
pub struct ComponentFactory {
    constructors: BTreeMap<String, Constructor>,
}

impl ComponentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `type_name`, replacing any earlier constructor for it.
    pub fn register<C, F>(&mut self, type_name: &str, make: F)
    where
        C: Component + 'static,
        F: Fn() -> C + 'static,
    {
        self.constructors
            .insert(type_name.to_string(), Box::new(move || Box::new(make()) as Box<dyn Component>));
    }

    pub fn create(&self, type_name: &str) -> Result<Box<dyn Component>> {
        self.constructors
            .get(type_name)
            .map(|make| make())
            .ok_or_else(|| FlowError::structure("", format!("unknown component type '{}'", type_name)))
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{FnComponent, VarSpec};
    use crate::store::NodeKind;

    #[test]
    fn test_create_known_and_unknown_types() {
        let mut factory = ComponentFactory::new();
        factory.register("Const", || FnComponent::new(vec![VarSpec::output("y", 1)], |_| Ok(())));
        assert_eq!(factory.type_names().collect::<Vec<_>>(), vec!["Const"]);
        assert_eq!(factory.create("Const").unwrap().kind(), NodeKind::Component);

        let err = factory.create("Missing").map(|_| ()).unwrap_err();
        assert_eq!(err.to_string(), "unknown component type 'Missing'");
    }
}
