use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dn;
use crate::record::EntityKind;

/// How directory entries are recognised as record variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Root of the faculty subtree, e.g. `ou=FCS,o=BUT,c=pl`.
    pub base_dn: String,
    /// Tried in order; the first matching rule decides the variant.
    #[serde(default = "default_rules")]
    pub rules: Vec<ClassificationRule>,
    /// Name of the role entry that designates a unit's head.
    #[serde(default = "default_unit_head_role")]
    pub unit_head_role: String,
    /// Name of the group below each unit whose `member` list holds the unit's employees.
    #[serde(default = "default_unit_employees_group")]
    pub unit_employees_group: String,
    /// RDN value of the container holding study cycles, used to read a student's `memberOf`.
    #[serde(default = "default_study_cycle_container")]
    pub study_cycle_container: String,
}

/// A rule matches when the entry carries `object_class` (if set) and lies below `base` (if set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub kind: EntityKind,
    #[serde(default)]
    pub object_class: Option<String>,
    /// Relative to [`AdapterConfig::base_dn`].
    #[serde(default)]
    pub base: Option<String>,
}

impl ClassificationRule {
    fn new(kind: EntityKind, object_class: Option<&str>, base: Option<&str>) -> Self {
        Self {
            kind,
            object_class: object_class.map(str::to_string),
            base: base.map(str::to_string),
        }
    }

    /// Absolute base DN of the rule, if it is scoped.
    pub fn absolute_base(&self, base_dn: &str) -> Option<String> {
        self.base.as_deref().map(|b| dn::join(b, base_dn))
    }
}

fn default_rules() -> Vec<ClassificationRule> {
    use EntityKind::*;
    vec![
        ClassificationRule::new(StudentEnrollment, Some("posixAccount"), Some("ou=students,ou=people")),
        ClassificationRule::new(Employee, Some("inetOrgPerson"), Some("ou=employees,ou=people")),
        ClassificationRule::new(Organization, Some("organizationalPerson"), Some("ou=organizations,ou=people")),
        ClassificationRule::new(StudyCycle, None, Some("ou=studycycles")),
        ClassificationRule::new(OrganizationalUnit, Some("organizationalUnit"), Some("ou=units")),
        ClassificationRule::new(Role, Some("organizationalRole"), None),
        ClassificationRule::new(MembershipGroup, Some("groupOfNames"), None),
    ]
}

fn default_unit_head_role() -> String {
    "kierownik".to_string()
}

fn default_unit_employees_group() -> String {
    "pracownicy".to_string()
}

fn default_study_cycle_container() -> String {
    "studycycles".to_string()
}

impl AdapterConfig {
    /// Default layout under the given base DN.
    pub fn new(base_dn: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            rules: default_rules(),
            unit_head_role: default_unit_head_role(),
            unit_employees_group: default_unit_employees_group(),
            study_cycle_container: default_study_cycle_container(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            base_dn = %self.base_dn,
            rules_count = self.rules.len(),
            unit_head_role = %self.unit_head_role,
            unit_employees_group = %self.unit_employees_group,
            "Loaded adapter config"
        );
        debug!(?self, "Adapter config loaded (full debug)");
    }
}
