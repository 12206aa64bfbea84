//! DirectoryRecord adapter: turns a raw [`DirectoryEntry`] into a typed [`ShadowRecord`].
//!
//! Classification walks the configured [`ClassificationRule`]s in order. Extraction then
//! reads the attributes of the chosen variant; a missing required attribute fails only
//! that entry.
//!
//! The directory keeps two references on the group side: a unit lists its employees
//! in the `member` attribute of its employees group, and a study cycle lists its
//! students in `member`. [`Adapter::links`] collects both from the whole fetch and
//! [`DirectoryLinks::apply`] fills them into the mapped records. An employee's own `ou`
//! and a student's `memberOf` are only used when the group side says nothing.
//!
//! Attribute names follow the faculty directory schema:
//!
//! | record | attributes |
//! |---|---|
//! | student | `uid`, `givenName`, `sn`, `mail`, `uidNumber`, `memberOf` |
//! | employee | `uid`, `givenName`, `sn`, `mail`, `title`, `employeeType`, `ou` |
//! | organization | `uid`, `cn`, `givenName`, `sn`, `mail` |
//! | study cycle | `cn`, `member` |
//! | unit | `ou`, `description` |
//! | role | `cn`, `roleOccupant` |
//! | group | `cn`, `member` |

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;
use tracing::trace;

use crate::config::{AdapterConfig, ClassificationRule};
use crate::dn;
use crate::error::MappingError;
use crate::record::{
    AuthorityKind, Capability, DirectoryEntry, EntityKind, Employee, MembershipGroup,
    Organization, OrganizationalUnit, Role, RoleScope, ShadowRecord, StudentEnrollment,
    StudyCycle, UserIdentity,
};

const UID: &str = "uid";
const UID_NUMBER: &str = "uidNumber";
const GIVEN_NAME: &str = "givenName";
const SURNAME: &str = "sn";
const COMMON_NAME: &str = "cn";
const MAIL: &str = "mail";
const TITLE: &str = "title";
const EMPLOYEE_TYPE: &str = "employeeType";
const OU: &str = "ou";
const DESCRIPTION: &str = "description";
const MEMBER: &str = "member";
const MEMBER_OF: &str = "memberOf";
const ROLE_OCCUPANT: &str = "roleOccupant";

/// Maps directory entries according to an [`AdapterConfig`].
#[derive(Debug, Clone)]
pub struct Adapter {
    config: AdapterConfig,
    rules: Vec<(ClassificationRule, Option<String>)>,
}

impl Adapter {
    pub fn new(config: AdapterConfig) -> Self {
        let rules = config
            .rules
            .iter()
            .map(|rule| (rule.clone(), rule.absolute_base(&config.base_dn)))
            .collect();
        Self { config, rules }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Picks the variant for an entry, or `None` when no rule matches.
    pub fn classify(&self, entry: &DirectoryEntry) -> Option<EntityKind> {
        self.rules
            .iter()
            .find(|(rule, base)| {
                let class_ok = rule
                    .object_class
                    .as_deref()
                    .map_or(true, |class| entry.has_object_class(class));
                let base_ok = base
                    .as_deref()
                    .map_or(true, |base| dn::is_strictly_under(&entry.dn, base));
                class_ok && base_ok
            })
            .map(|(rule, _)| rule.kind)
    }

    pub fn map(&self, entry: &DirectoryEntry) -> Result<ShadowRecord, MappingError> {
        let kind = self
            .classify(entry)
            .ok_or_else(|| MappingError::UnknownVariant {
                dn: entry.dn.clone(),
            })?;
        trace!(dn = %entry.dn, %kind, "Classified directory entry");

        let fields = Fields { entry, kind };
        let record = match kind {
            EntityKind::StudentEnrollment => ShadowRecord::StudentEnrollment(StudentEnrollment {
                identity: fields.identity([Capability::Student])?,
                uid_number: fields.uid_number()?,
                study_cycles: self.study_cycles_of(entry),
            }),
            EntityKind::Employee => {
                let title = fields.optional(TITLE);
                let capabilities = if title.as_deref().is_some_and(is_doctor_or_above) {
                    vec![
                        Capability::ThesisTopicAuthor,
                        Capability::Supervisor,
                        Capability::Reviewer,
                    ]
                } else {
                    vec![]
                };
                ShadowRecord::Employee(Employee {
                    identity: fields.identity(capabilities)?,
                    title,
                    position: fields.optional(EMPLOYEE_TYPE),
                    organizational_unit: fields.optional(OU),
                })
            }
            EntityKind::Organization => ShadowRecord::Organization(Organization {
                identity: fields.identity([Capability::ThesisTopicAuthor])?,
                name: fields.required(COMMON_NAME)?,
            }),
            EntityKind::StudyCycle => ShadowRecord::StudyCycle(StudyCycle {
                name: fields.required_or_rdn(COMMON_NAME)?,
                members: fields.referenced(MEMBER),
            }),
            EntityKind::OrganizationalUnit => {
                let short_name = fields.required_or_rdn(OU)?;
                ShadowRecord::OrganizationalUnit(OrganizationalUnit {
                    name: fields.optional(DESCRIPTION).unwrap_or_else(|| short_name.clone()),
                    short_name,
                })
            }
            EntityKind::Role => {
                let name = fields.required_or_rdn(COMMON_NAME)?;
                ShadowRecord::Role(Role {
                    id: dn::normalize(&entry.dn),
                    scope: self.role_scope(&name, &entry.dn),
                    occupant: entry.first(ROLE_OCCUPANT).and_then(dn::leaf_value),
                    name,
                })
            }
            EntityKind::MembershipGroup => ShadowRecord::MembershipGroup(MembershipGroup {
                id: dn::normalize(&entry.dn),
                name: fields.required_or_rdn(COMMON_NAME)?,
                members: fields.referenced(MEMBER),
            }),
            EntityKind::Unclassified => {
                return Err(MappingError::UnknownVariant {
                    dn: entry.dn.clone(),
                })
            }
        };
        Ok(record)
    }

    fn role_scope(&self, name: &str, role_dn: &str) -> RoleScope {
        if name.eq_ignore_ascii_case(&self.config.unit_head_role) {
            if let Some(parent) = dn::parent_rdn(role_dn).filter(|p| p.attribute == "ou") {
                return RoleScope::UnitHead { unit: parent.value };
            }
        }
        AuthorityKind::from_directory_name(name)
            .map(RoleScope::Authority)
            .unwrap_or(RoleScope::Other)
    }

    /// Collects the group-side references of a fetch: employees groups below units and
    /// the member lists of study cycles.
    pub fn links(&self, entries: &[DirectoryEntry]) -> DirectoryLinks {
        let mut links = DirectoryLinks::default();
        for entry in entries {
            if let Some(unit) = self.employees_group_unit(&entry.dn) {
                let fields = Fields {
                    entry,
                    kind: EntityKind::MembershipGroup,
                };
                for employee in fields.referenced(MEMBER) {
                    // An employee listed by several units belongs to the first one.
                    links
                        .unit_of_employee
                        .entry(employee.to_lowercase())
                        .or_insert_with(|| unit.clone());
                }
            } else if self.classify(entry) == Some(EntityKind::StudyCycle) {
                let fields = Fields {
                    entry,
                    kind: EntityKind::StudyCycle,
                };
                let Ok(cycle) = fields.required_or_rdn(COMMON_NAME) else {
                    continue;
                };
                for student in fields.referenced(MEMBER) {
                    links
                        .cycles_of_student
                        .entry(student.to_lowercase())
                        .or_default()
                        .insert(cycle.clone());
                }
            }
        }
        trace!(
            employees = links.unit_of_employee.len(),
            students = links.cycles_of_student.len(),
            "Collected group-side references"
        );
        links
    }

    /// Unit short name when `group_dn` is `cn=<employees group>,ou=<unit>,...`.
    fn employees_group_unit(&self, group_dn: &str) -> Option<String> {
        let mut rdns = dn::rdns(group_dn).into_iter();
        let leaf = rdns.next()?;
        let parent = rdns.next()?;
        let is_group = leaf.attribute.eq_ignore_ascii_case(COMMON_NAME)
            && leaf
                .value
                .eq_ignore_ascii_case(&self.config.unit_employees_group);
        (is_group && parent.attribute.eq_ignore_ascii_case(OU) && !parent.value.is_empty())
            .then_some(parent.value)
    }

    /// Study cycles a student belongs to, read from `memberOf` references into the cycles container.
    fn study_cycles_of(&self, entry: &DirectoryEntry) -> BTreeSet<String> {
        entry
            .values(MEMBER_OF)
            .iter()
            .filter(|group| {
                dn::parent_rdn(group).is_some_and(|p| {
                    p.value
                        .eq_ignore_ascii_case(&self.config.study_cycle_container)
                })
            })
            .filter_map(|group| dn::leaf_value(group))
            .collect()
    }
}

/// Employee-to-unit and student-to-cycle references gathered by [`Adapter::links`],
/// keyed by lowercased username.
#[derive(Debug, Clone, Default)]
pub struct DirectoryLinks {
    unit_of_employee: HashMap<String, String>,
    cycles_of_student: HashMap<String, BTreeSet<String>>,
}

impl DirectoryLinks {
    pub fn unit_of(&self, username: &str) -> Option<&str> {
        self.unit_of_employee
            .get(&username.to_lowercase())
            .map(String::as_str)
    }

    pub fn cycles_of(&self, username: &str) -> Option<&BTreeSet<String>> {
        self.cycles_of_student.get(&username.to_lowercase())
    }

    /// Fills the employee's unit and adds the student's cycles.
    pub fn apply(&self, record: &mut ShadowRecord) {
        match record {
            ShadowRecord::Employee(employee) => {
                if let Some(unit) = self.unit_of(&employee.identity.username) {
                    employee.organizational_unit = Some(unit.to_string());
                }
            }
            ShadowRecord::StudentEnrollment(student) => {
                if let Some(cycles) = self.cycles_of(&student.identity.username) {
                    student.study_cycles.extend(cycles.iter().cloned());
                }
            }
            _ => {}
        }
    }
}

/// "dr", "dr hab.", "prof." and combinations qualify an employee to supervise and review.
pub fn is_doctor_or_above(title: &str) -> bool {
    static DOCTOR: OnceLock<Regex> = OnceLock::new();
    DOCTOR
        .get_or_init(|| Regex::new(r"(?i)\b(dr|prof)\b").expect("static regex is valid"))
        .is_match(title)
}

/// Attribute access for one entry, producing errors tagged with the entry's kind.
struct Fields<'a> {
    entry: &'a DirectoryEntry,
    kind: EntityKind,
}

impl Fields<'_> {
    fn missing(&self, attribute: &'static str) -> MappingError {
        MappingError::MissingAttribute {
            kind: self.kind,
            dn: self.entry.dn.clone(),
            attribute,
        }
    }

    fn required(&self, attribute: &'static str) -> Result<String, MappingError> {
        self.entry
            .first(attribute)
            .map(str::to_string)
            .ok_or_else(|| self.missing(attribute))
    }

    /// Like [`Self::required`], falling back to the leaf RDN when it names the same attribute.
    fn required_or_rdn(&self, attribute: &'static str) -> Result<String, MappingError> {
        self.entry
            .first(attribute)
            .map(str::to_string)
            .or_else(|| {
                dn::rdns(&self.entry.dn)
                    .into_iter()
                    .next()
                    .filter(|rdn| rdn.attribute.eq_ignore_ascii_case(attribute))
                    .map(|rdn| rdn.value)
                    .filter(|v| !v.is_empty())
            })
            .ok_or_else(|| self.missing(attribute))
    }

    fn optional(&self, attribute: &str) -> Option<String> {
        self.entry.first(attribute).map(str::to_string)
    }

    fn referenced(&self, attribute: &str) -> BTreeSet<String> {
        self.entry
            .values(attribute)
            .iter()
            .filter_map(|v| dn::leaf_value(v))
            .collect()
    }

    fn identity(
        &self,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Result<UserIdentity, MappingError> {
        Ok(UserIdentity {
            username: self.required(UID)?,
            first_name: self.required(GIVEN_NAME)?,
            last_name: self.required(SURNAME)?,
            email: self.optional(MAIL),
            capabilities: capabilities.into_iter().collect(),
        })
    }

    fn uid_number(&self) -> Result<Option<u32>, MappingError> {
        self.entry
            .first(UID_NUMBER)
            .map(|raw| {
                raw.parse::<u32>()
                    .map_err(|_| MappingError::InvalidAttribute {
                        kind: self.kind,
                        dn: self.entry.dn.clone(),
                        attribute: UID_NUMBER,
                        value: raw.to_string(),
                    })
            })
            .transpose()
    }
}
