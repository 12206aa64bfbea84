//! Data model shared by every stage of a run.
//!
//! - [`DirectoryEntry`]: raw input as the directory hands it over.
//! - [`ShadowRecord`]: typed view of one entry, one variant per [`EntityKind`].
//! - [`AuthoritativeRecord`]: schema-agnostic view of a row in the system of record,
//!   a map of tracked field names to [`FieldValue`]s.
//!
//! Shadow and authoritative records meet through [`ShadowRecord::tracked_fields`]:
//! the reconciler only ever compares and writes the fields listed there.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The record variants known to the synchroniser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Organization,
    OrganizationalUnit,
    StudyCycle,
    Employee,
    StudentEnrollment,
    Role,
    MembershipGroup,
    /// Entries no classification rule matched. Only ever appears in counters.
    Unclassified,
}

impl EntityKind {
    /// Reconciliation order: referenced variants come before the variants referencing them.
    pub const DEPENDENCY_ORDER: [EntityKind; 7] = [
        EntityKind::Organization,
        EntityKind::OrganizationalUnit,
        EntityKind::StudyCycle,
        EntityKind::Employee,
        EntityKind::StudentEnrollment,
        EntityKind::Role,
        EntityKind::MembershipGroup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Organization => "organization",
            EntityKind::OrganizationalUnit => "organizational_unit",
            EntityKind::StudyCycle => "study_cycle",
            EntityKind::Employee => "employee",
            EntityKind::StudentEnrollment => "student_enrollment",
            EntityKind::Role => "role",
            EntityKind::MembershipGroup => "membership_group",
            EntityKind::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry as returned by the directory: a distinguished name plus attributes.
///
/// Attribute names are case-insensitive in LDAP, so they are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDirectoryEntry")]
pub struct DirectoryEntry {
    pub dn: String,
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style helper, mostly for tests and file snapshots.
    pub fn with_attr<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes
            .entry(name.to_ascii_lowercase())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// All values of an attribute, empty if absent.
    pub fn values(&self, name: &str) -> &[String] {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First non-blank value of an attribute, trimmed.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name)
            .iter()
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    pub fn has_object_class(&self, class: &str) -> bool {
        self.values("objectClass")
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(class))
    }
}

/// Wire shape of a [`DirectoryEntry`]: attribute values may be a single string or a list.
#[derive(Deserialize)]
struct RawDirectoryEntry {
    dn: String,
    #[serde(default)]
    attributes: BTreeMap<String, OneOrMany>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<RawDirectoryEntry> for DirectoryEntry {
    fn from(raw: RawDirectoryEntry) -> Self {
        let mut entry = DirectoryEntry::new(raw.dn);
        for (name, values) in raw.attributes {
            entry = match values {
                OneOrMany::One(v) => entry.with_attr(&name, [v]),
                OneOrMany::Many(vs) => entry.with_attr(&name, vs),
            };
        }
        entry
    }
}

/// What a synced user is allowed to do in the thesis application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Student,
    ThesisTopicAuthor,
    Supervisor,
    Reviewer,
    DepartmentHead,
    FacultyHead,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Student => "student",
            Capability::ThesisTopicAuthor => "thesis_topic_author",
            Capability::Supervisor => "supervisor",
            Capability::Reviewer => "reviewer",
            Capability::DepartmentHead => "department_head",
            Capability::FacultyHead => "faculty_head",
        }
    }
}

/// Identity fields shared by every user-backed record (students, employees, organizations).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub capabilities: BTreeSet<Capability>,
}

/// An external organization (company, association) proposing thesis topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    /// The organization's representative.
    pub identity: UserIdentity,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationalUnit {
    /// Short name, the `ou` RDN value.
    pub short_name: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyCycle {
    pub name: String,
    /// Usernames of the students following the cycle.
    pub members: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    pub identity: UserIdentity,
    /// Academic title, e.g. "dr inż.".
    pub title: Option<String>,
    /// Position held, e.g. "adiunkt".
    pub position: Option<String>,
    pub organizational_unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentEnrollment {
    pub identity: UserIdentity,
    pub uid_number: Option<u32>,
    pub study_cycles: BTreeSet<String>,
}

/// Faculty authorities the directory publishes under its authorities branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthorityKind {
    Dean,
    ViceDeanForPromotion,
    ViceDeanForResearch,
    ViceDeanForStudents,
}

impl AuthorityKind {
    pub const ALL: [AuthorityKind; 4] = [
        AuthorityKind::Dean,
        AuthorityKind::ViceDeanForPromotion,
        AuthorityKind::ViceDeanForResearch,
        AuthorityKind::ViceDeanForStudents,
    ];

    /// Role name as it appears in the directory.
    pub fn directory_name(&self) -> &'static str {
        match self {
            AuthorityKind::Dean => "dean",
            AuthorityKind::ViceDeanForPromotion => "vice-dean-promotion",
            AuthorityKind::ViceDeanForResearch => "vice-dean-science",
            AuthorityKind::ViceDeanForStudents => "vice-dean-students",
        }
    }

    pub fn from_directory_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.directory_name().eq_ignore_ascii_case(name))
    }

    /// Dean and vice-dean for students act as faculty heads.
    pub fn grants(&self) -> Option<Capability> {
        match self {
            AuthorityKind::Dean | AuthorityKind::ViceDeanForStudents => {
                Some(Capability::FacultyHead)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleScope {
    Authority(AuthorityKind),
    UnitHead { unit: String },
    Other,
}

impl RoleScope {
    pub fn grants(&self) -> Option<Capability> {
        match self {
            RoleScope::Authority(kind) => kind.grants(),
            RoleScope::UnitHead { .. } => Some(Capability::DepartmentHead),
            RoleScope::Other => None,
        }
    }

    fn field_text(&self) -> String {
        match self {
            RoleScope::Authority(kind) => format!("authority:{}", kind.directory_name()),
            RoleScope::UnitHead { unit } => format!("unit_head:{unit}"),
            RoleScope::Other => "other".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    /// Normalized DN of the role entry.
    pub id: String,
    pub name: String,
    pub scope: RoleScope,
    /// Username of the employee holding the role.
    pub occupant: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipGroup {
    /// Normalized DN of the group entry.
    pub id: String,
    pub name: String,
    pub members: BTreeSet<String>,
}

/// Typed, normalized view of a directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShadowRecord {
    Organization(Organization),
    OrganizationalUnit(OrganizationalUnit),
    StudyCycle(StudyCycle),
    Employee(Employee),
    StudentEnrollment(StudentEnrollment),
    Role(Role),
    MembershipGroup(MembershipGroup),
}

// Tracked field names. Authoritative rows may hold more fields; those are never touched.
pub mod fields {
    pub const FIRST_NAME: &str = "first_name";
    pub const LAST_NAME: &str = "last_name";
    pub const EMAIL: &str = "email";
    pub const CAPABILITIES: &str = "capabilities";
    pub const NAME: &str = "name";
    pub const TITLE: &str = "title";
    pub const POSITION: &str = "position";
    pub const ORGANIZATIONAL_UNIT: &str = "organizational_unit";
    pub const UID_NUMBER: &str = "uid_number";
    pub const STUDY_CYCLES: &str = "study_cycles";
    pub const MEMBERS: &str = "members";
    pub const SCOPE: &str = "scope";
    pub const OCCUPANT: &str = "occupant";
    pub const GRANTS: &str = "grants";
}

impl ShadowRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            ShadowRecord::Organization(_) => EntityKind::Organization,
            ShadowRecord::OrganizationalUnit(_) => EntityKind::OrganizationalUnit,
            ShadowRecord::StudyCycle(_) => EntityKind::StudyCycle,
            ShadowRecord::Employee(_) => EntityKind::Employee,
            ShadowRecord::StudentEnrollment(_) => EntityKind::StudentEnrollment,
            ShadowRecord::Role(_) => EntityKind::Role,
            ShadowRecord::MembershipGroup(_) => EntityKind::MembershipGroup,
        }
    }

    /// Key shared with the authoritative store.
    pub fn external_id(&self) -> &str {
        match self {
            ShadowRecord::Organization(o) => &o.identity.username,
            ShadowRecord::OrganizationalUnit(u) => &u.short_name,
            ShadowRecord::StudyCycle(c) => &c.name,
            ShadowRecord::Employee(e) => &e.identity.username,
            ShadowRecord::StudentEnrollment(s) => &s.identity.username,
            ShadowRecord::Role(r) => &r.id,
            ShadowRecord::MembershipGroup(g) => &g.id,
        }
    }

    /// The fields the reconciler owns for this record.
    pub fn tracked_fields(&self) -> BTreeMap<String, FieldValue> {
        let mut out = BTreeMap::new();
        let mut put = |name: &str, value: FieldValue| {
            out.insert(name.to_string(), value);
        };
        match self {
            ShadowRecord::Organization(o) => {
                identity_fields(&o.identity, &mut put);
                put(fields::NAME, FieldValue::text(&o.name));
            }
            ShadowRecord::OrganizationalUnit(u) => {
                put(fields::NAME, FieldValue::text(&u.name));
            }
            ShadowRecord::StudyCycle(c) => {
                put(fields::NAME, FieldValue::text(&c.name));
                put(fields::MEMBERS, FieldValue::list(c.members.iter()));
            }
            ShadowRecord::Employee(e) => {
                identity_fields(&e.identity, &mut put);
                put(fields::TITLE, FieldValue::optional(e.title.as_deref()));
                put(fields::POSITION, FieldValue::optional(e.position.as_deref()));
                put(
                    fields::ORGANIZATIONAL_UNIT,
                    FieldValue::optional(e.organizational_unit.as_deref()),
                );
            }
            ShadowRecord::StudentEnrollment(s) => {
                identity_fields(&s.identity, &mut put);
                put(
                    fields::UID_NUMBER,
                    s.uid_number
                        .map(|n| FieldValue::Text(n.to_string()))
                        .unwrap_or(FieldValue::Empty),
                );
                put(fields::STUDY_CYCLES, FieldValue::list(s.study_cycles.iter()));
            }
            ShadowRecord::Role(r) => {
                put(fields::NAME, FieldValue::text(&r.name));
                put(fields::SCOPE, FieldValue::Text(r.scope.field_text()));
                put(fields::OCCUPANT, FieldValue::optional(r.occupant.as_deref()));
                put(
                    fields::GRANTS,
                    FieldValue::optional(r.scope.grants().map(|c| c.as_str())),
                );
            }
            ShadowRecord::MembershipGroup(g) => {
                put(fields::NAME, FieldValue::text(&g.name));
                put(fields::MEMBERS, FieldValue::list(g.members.iter()));
            }
        }
        out
    }
}

fn identity_fields(identity: &UserIdentity, put: &mut impl FnMut(&str, FieldValue)) {
    put(fields::FIRST_NAME, FieldValue::text(&identity.first_name));
    put(fields::LAST_NAME, FieldValue::text(&identity.last_name));
    put(fields::EMAIL, FieldValue::optional(identity.email.as_deref()));
    put(
        fields::CAPABILITIES,
        FieldValue::list(identity.capabilities.iter().map(|c| c.as_str())),
    );
}

/// Value of one tracked field.
///
/// Text is compared exactly (it is trimmed when mapped). Lists are kept sorted and
/// deduplicated, so they compare as sets. Stored values go through the same
/// normalization when deserialized, so `""` and `[]` read back as [`FieldValue::Empty`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged, from = "StoredFieldValue")]
pub enum FieldValue {
    #[default]
    Empty,
    Text(String),
    List(Vec<String>),
}

/// Wire shape of a [`FieldValue`] before normalization.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredFieldValue {
    Empty,
    Text(String),
    List(Vec<String>),
}

impl From<StoredFieldValue> for FieldValue {
    fn from(stored: StoredFieldValue) -> Self {
        match stored {
            StoredFieldValue::Empty => FieldValue::Empty,
            StoredFieldValue::Text(text) => FieldValue::optional(Some(&text)),
            StoredFieldValue::List(list) => FieldValue::list(list),
        }
    }
}

impl FieldValue {
    pub fn text(value: &str) -> Self {
        Self::optional(Some(value))
    }

    pub fn optional(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => FieldValue::Text(v.to_string()),
            _ => FieldValue::Empty,
        }
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = values
            .into_iter()
            .map(|v| v.as_ref().trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if set.is_empty() {
            FieldValue::Empty
        } else {
            FieldValue::List(set.into_iter().collect())
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> &[String] {
        match self {
            FieldValue::List(l) => l,
            _ => &[],
        }
    }
}

/// A single tracked field that differs between directory and store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: String,
    pub before: FieldValue,
    pub after: FieldValue,
}

/// A row of the system of record, as seen through the repository contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoritativeRecord {
    pub kind: EntityKind,
    pub external_id: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl AuthoritativeRecord {
    pub fn from_shadow(shadow: &ShadowRecord) -> Self {
        Self {
            kind: shadow.kind(),
            external_id: shadow.external_id().to_string(),
            fields: shadow.tracked_fields(),
        }
    }

    pub fn field(&self, name: &str) -> &FieldValue {
        static EMPTY: FieldValue = FieldValue::Empty;
        self.fields.get(name).unwrap_or(&EMPTY)
    }

    /// Tracked fields of `shadow` whose value differs from this record.
    ///
    /// A field missing from the stored row counts as [`FieldValue::Empty`]. Fields the
    /// store holds but the shadow does not track are ignored.
    pub fn diff(&self, shadow: &ShadowRecord) -> Vec<FieldChange> {
        shadow
            .tracked_fields()
            .into_iter()
            .filter_map(|(field, after)| {
                let before = self.field(&field).clone();
                (before != after).then_some(FieldChange {
                    field,
                    before,
                    after,
                })
            })
            .collect()
    }

    /// Applies changes in place, leaving untracked fields untouched.
    pub fn apply(&mut self, changes: &[FieldChange]) {
        for change in changes {
            self.fields
                .insert(change.field.clone(), change.after.clone());
        }
    }

    /// Other records this one points at, which must exist in the store first.
    ///
    /// Member lists are soft links and are not reported.
    pub fn references(&self) -> Vec<(EntityKind, String)> {
        let mut refs = Vec::new();
        match self.kind {
            EntityKind::Employee => {
                if let Some(unit) = self.field(fields::ORGANIZATIONAL_UNIT).as_text() {
                    refs.push((EntityKind::OrganizationalUnit, unit.to_string()));
                }
            }
            EntityKind::StudentEnrollment => {
                for cycle in self.field(fields::STUDY_CYCLES).as_list() {
                    refs.push((EntityKind::StudyCycle, cycle.clone()));
                }
            }
            EntityKind::Role => {
                if let Some(occupant) = self.field(fields::OCCUPANT).as_text() {
                    refs.push((EntityKind::Employee, occupant.to_string()));
                }
                if let Some(unit) = self
                    .field(fields::SCOPE)
                    .as_text()
                    .and_then(|s| s.strip_prefix("unit_head:"))
                {
                    refs.push((EntityKind::OrganizationalUnit, unit.to_string()));
                }
            }
            _ => {}
        }
        refs
    }
}
