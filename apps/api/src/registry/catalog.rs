use std::collections::BTreeMap;

use crate::models::learning::{LearningModule, MAX_MODULE_MINUTES, MIN_MODULE_MINUTES};
use crate::registry::taxonomy::SkillTaxonomy;
use crate::registry::RegistryError;

/// Micro-learning module catalog, validated against a taxonomy.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, LearningModule>,
}

impl ModuleCatalog {
    pub fn from_modules(
        modules: Vec<LearningModule>,
        taxonomy: &SkillTaxonomy,
    ) -> Result<Self, RegistryError> {
        let mut map = BTreeMap::new();
        for module in modules {
            if !(MIN_MODULE_MINUTES..=MAX_MODULE_MINUTES).contains(&module.duration_minutes) {
                return Err(RegistryError::InvalidDuration {
                    module: module.id,
                    minutes: module.duration_minutes,
                });
            }
            if module.skill_ids.is_empty() {
                return Err(RegistryError::EmptyModule(module.id));
            }
            if let Some(unknown) = module.skill_ids.iter().find(|s| taxonomy.get(s).is_none()) {
                return Err(RegistryError::UnknownModuleSkill {
                    module: module.id.clone(),
                    skill: unknown.clone(),
                });
            }
            if map.contains_key(&module.id) {
                return Err(RegistryError::DuplicateModule(module.id));
            }
            map.insert(module.id.clone(), module);
        }
        Ok(Self { modules: map })
    }

    pub fn get(&self, module_id: &str) -> Option<&LearningModule> {
        self.modules.get(module_id)
    }

    /// Modules in id order.
    pub fn modules(&self) -> impl Iterator<Item = &LearningModule> {
        self.modules.values()
    }

    pub fn covering<'a>(&'a self, skill_id: &'a str) -> impl Iterator<Item = &'a LearningModule> {
        self.modules.values().filter(move |m| m.covers(skill_id))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }
}
