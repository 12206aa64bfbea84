use ldapsync_core::adapter::{is_doctor_or_above, Adapter};
use ldapsync_core::config::AdapterConfig;
use ldapsync_core::error::MappingError;
use ldapsync_core::record::{
    AuthorityKind, Capability, DirectoryEntry, EntityKind, RoleScope, ShadowRecord,
};

const BASE: &str = "ou=FCS,o=BUT,c=pl";

fn adapter() -> Adapter {
    Adapter::new(AdapterConfig::new(BASE))
}

fn dn(relative: &str) -> String {
    format!("{relative},{BASE}")
}

fn student(uid: &str) -> DirectoryEntry {
    DirectoryEntry::new(dn(&format!("uid={uid},ou=students,ou=people")))
        .with_attr("objectClass", ["top", "posixAccount", "inetOrgPerson"])
        .with_attr("uid", [uid])
        .with_attr("givenName", ["Anna"])
        .with_attr("sn", ["Nowak"])
        .with_attr("mail", ["anna.nowak@student.example.edu"])
        .with_attr("uidNumber", ["1001"])
        .with_attr(
            "memberOf",
            [
                dn("cn=INF-1,ou=studycycles"),
                dn("cn=INF-2,ou=studycycles"),
                dn("cn=chess-club,ou=groups"),
            ],
        )
}

fn employee(uid: &str, title: &str) -> DirectoryEntry {
    DirectoryEntry::new(dn(&format!("uid={uid},ou=employees,ou=people")))
        .with_attr("objectClass", ["inetOrgPerson", "organizationalPerson"])
        .with_attr("uid", [uid])
        .with_attr("givenName", ["Jan"])
        .with_attr("sn", ["Kowalski"])
        .with_attr("title", [title])
        .with_attr("employeeType", ["adiunkt"])
        .with_attr("ou", ["CS-DEPT"])
}

struct TestCase {
    name: &'static str,
    entry: DirectoryEntry,
    expected_kind: EntityKind,
    expected_id: String,
}

#[test]
fn test_classifies_every_variant_table_driven() {
    let test_cases = vec![
        TestCase {
            name: "student under students branch",
            entry: student("s1001"),
            expected_kind: EntityKind::StudentEnrollment,
            expected_id: "s1001".into(),
        },
        TestCase {
            name: "employee under employees branch",
            entry: employee("jkowalski", "dr inż."),
            expected_kind: EntityKind::Employee,
            expected_id: "jkowalski".into(),
        },
        TestCase {
            name: "organization representative",
            entry: DirectoryEntry::new(dn("uid=acme,ou=organizations,ou=people"))
                .with_attr("objectClass", ["organizationalPerson", "inetOrgPerson"])
                .with_attr("uid", ["acme"])
                .with_attr("cn", ["ACME Sp. z o.o."])
                .with_attr("givenName", ["Ewa"])
                .with_attr("sn", ["Zielinska"]),
            expected_kind: EntityKind::Organization,
            expected_id: "acme".into(),
        },
        TestCase {
            name: "study cycle needs no object class",
            entry: DirectoryEntry::new(dn("cn=INF-1,ou=studycycles"))
                .with_attr("cn", ["INF-1"]),
            expected_kind: EntityKind::StudyCycle,
            expected_id: "INF-1".into(),
        },
        TestCase {
            name: "organizational unit",
            entry: DirectoryEntry::new(dn("ou=CS-DEPT,ou=units"))
                .with_attr("objectClass", ["organizationalUnit"])
                .with_attr("ou", ["CS-DEPT"]),
            expected_kind: EntityKind::OrganizationalUnit,
            expected_id: "CS-DEPT".into(),
        },
        TestCase {
            name: "role below a unit",
            entry: DirectoryEntry::new(dn("cn=kierownik,ou=CS-DEPT,ou=units"))
                .with_attr("objectClass", ["organizationalRole"])
                .with_attr("cn", ["kierownik"]),
            expected_kind: EntityKind::Role,
            expected_id: "cn=kierownik,ou=cs-dept,ou=units,ou=fcs,o=but,c=pl".into(),
        },
        TestCase {
            name: "membership group anywhere",
            entry: DirectoryEntry::new(dn("cn=chess-club,ou=groups"))
                .with_attr("objectClass", ["groupOfNames"])
                .with_attr("cn", ["chess-club"]),
            expected_kind: EntityKind::MembershipGroup,
            expected_id: "cn=chess-club,ou=groups,ou=fcs,o=but,c=pl".into(),
        },
    ];

    let adapter = adapter();
    for case in test_cases {
        let record = adapter
            .map(&case.entry)
            .unwrap_or_else(|e| panic!("{}: mapping failed: {e}", case.name));
        assert_eq!(record.kind(), case.expected_kind, "{}", case.name);
        assert_eq!(record.external_id(), case.expected_id, "{}", case.name);
    }
}

#[test]
fn test_student_reads_cycles_from_member_of() {
    let record = adapter().map(&student("s1001")).expect("student maps");
    let ShadowRecord::StudentEnrollment(s) = record else {
        panic!("expected a student, got {record:?}");
    };
    assert_eq!(s.identity.first_name, "Anna");
    assert_eq!(s.identity.email.as_deref(), Some("anna.nowak@student.example.edu"));
    assert_eq!(s.uid_number, Some(1001));
    assert!(s.identity.capabilities.contains(&Capability::Student));
    let cycles: Vec<&str> = s.study_cycles.iter().map(String::as_str).collect();
    assert_eq!(cycles, vec!["INF-1", "INF-2"], "groups outside study cycles are ignored");
}

#[test]
fn test_employee_capabilities_follow_title() {
    let adapter = adapter();

    let ShadowRecord::Employee(doctor) = adapter.map(&employee("jk", "dr hab. inż.")).unwrap()
    else {
        panic!("expected employee");
    };
    assert_eq!(
        doctor.identity.capabilities.iter().copied().collect::<Vec<_>>(),
        vec![
            Capability::ThesisTopicAuthor,
            Capability::Supervisor,
            Capability::Reviewer
        ]
    );
    assert_eq!(doctor.organizational_unit.as_deref(), Some("CS-DEPT"));
    assert_eq!(doctor.position.as_deref(), Some("adiunkt"));

    let ShadowRecord::Employee(master) = adapter.map(&employee("am", "mgr inż.")).unwrap() else {
        panic!("expected employee");
    };
    assert!(master.identity.capabilities.is_empty());
}

#[test]
fn test_title_matching() {
    assert!(is_doctor_or_above("dr"));
    assert!(is_doctor_or_above("Prof. dr hab."));
    assert!(is_doctor_or_above("dr inż."));
    assert!(!is_doctor_or_above("mgr inż."));
    assert!(!is_doctor_or_above("drummer"));
}

#[test]
fn test_role_scopes() {
    let adapter = adapter();
    let occupant = dn("uid=jkowalski,ou=employees,ou=people");

    let head = DirectoryEntry::new(dn("cn=kierownik,ou=CS-DEPT,ou=units"))
        .with_attr("objectClass", ["organizationalRole"])
        .with_attr("cn", ["kierownik"])
        .with_attr("roleOccupant", [occupant.as_str()]);
    let ShadowRecord::Role(role) = adapter.map(&head).unwrap() else {
        panic!("expected role");
    };
    assert_eq!(
        role.scope,
        RoleScope::UnitHead {
            unit: "CS-DEPT".into()
        }
    );
    assert_eq!(role.occupant.as_deref(), Some("jkowalski"));
    assert_eq!(role.scope.grants(), Some(Capability::DepartmentHead));

    let dean = DirectoryEntry::new(dn("cn=dean,ou=authorities"))
        .with_attr("objectClass", ["organizationalRole"])
        .with_attr("roleOccupant", [occupant.as_str()]);
    let ShadowRecord::Role(role) = adapter.map(&dean).unwrap() else {
        panic!("expected role");
    };
    assert_eq!(role.name, "dean", "name falls back to the cn RDN");
    assert_eq!(role.scope, RoleScope::Authority(AuthorityKind::Dean));
    assert_eq!(role.scope.grants(), Some(Capability::FacultyHead));

    let research = DirectoryEntry::new(dn("cn=vice-dean-science,ou=authorities"))
        .with_attr("objectClass", ["organizationalRole"]);
    let ShadowRecord::Role(role) = adapter.map(&research).unwrap() else {
        panic!("expected role");
    };
    assert_eq!(role.scope.grants(), None);
    assert_eq!(role.occupant, None);
}

#[test]
fn test_unit_name_falls_back_to_short_name() {
    let adapter = adapter();
    let described = DirectoryEntry::new(dn("ou=CS-DEPT,ou=units"))
        .with_attr("objectClass", ["organizationalUnit"])
        .with_attr("description", ["Department of Computer Science"]);
    let ShadowRecord::OrganizationalUnit(unit) = adapter.map(&described).unwrap() else {
        panic!("expected unit");
    };
    assert_eq!(unit.short_name, "CS-DEPT");
    assert_eq!(unit.name, "Department of Computer Science");

    let bare = DirectoryEntry::new(dn("ou=MATH,ou=units")).with_attr("objectClass", ["organizationalUnit"]);
    let ShadowRecord::OrganizationalUnit(unit) = adapter.map(&bare).unwrap() else {
        panic!("expected unit");
    };
    assert_eq!(unit.name, "MATH");
}

#[test]
fn test_missing_required_attribute_fails_the_entry() {
    let mut entry = student("s1");
    entry.attributes.remove("sn");

    let err = adapter().map(&entry).unwrap_err();
    assert_eq!(
        err,
        MappingError::MissingAttribute {
            kind: EntityKind::StudentEnrollment,
            dn: entry.dn.clone(),
            attribute: "sn",
        }
    );
    assert_eq!(err.kind(), EntityKind::StudentEnrollment);
}

#[test]
fn test_blank_attribute_counts_as_missing() {
    let mut entry = student("s1");
    entry.attributes.insert("givenname".into(), vec!["   ".into()]);

    let err = adapter().map(&entry).unwrap_err();
    assert!(
        matches!(err, MappingError::MissingAttribute { attribute: "givenName", .. }),
        "got {err:?}"
    );
}

#[test]
fn test_non_numeric_uid_number_is_invalid() {
    let mut entry = student("s1");
    entry.attributes.insert("uidnumber".into(), vec!["abc".into()]);

    let err = adapter().map(&entry).unwrap_err();
    assert!(
        matches!(
            &err,
            MappingError::InvalidAttribute { attribute: "uidNumber", value, .. } if value == "abc"
        ),
        "got {err:?}"
    );
}

#[test]
fn test_unclassified_entries() {
    let adapter = adapter();
    let printer = DirectoryEntry::new(dn("cn=printer,ou=devices")).with_attr("objectClass", ["device"]);
    let container = DirectoryEntry::new(dn("ou=students,ou=people"))
        .with_attr("objectClass", ["organizationalUnit"]);

    for entry in [printer, container] {
        assert_eq!(adapter.classify(&entry), None, "{}", entry.dn);
        let err = adapter.map(&entry).unwrap_err();
        assert_eq!(err.kind(), EntityKind::Unclassified);
    }
}

#[test]
fn test_attribute_names_are_case_insensitive() {
    let entry = DirectoryEntry::new(dn("uid=s9,ou=students,ou=people"))
        .with_attr("OBJECTCLASS", ["posixaccount"])
        .with_attr("UID", ["s9"])
        .with_attr("GivenName", ["Piotr"])
        .with_attr("SN", ["Wisniewski"]);
    let record = adapter().map(&entry).expect("maps regardless of attribute case");
    assert_eq!(record.external_id(), "s9");
}

fn employees_group(unit: &str, members: &[&str]) -> DirectoryEntry {
    DirectoryEntry::new(dn(&format!("cn=pracownicy,ou={unit},ou=units")))
        .with_attr("objectClass", ["groupOfNames"])
        .with_attr("cn", ["pracownicy"])
        .with_attr(
            "member",
            members
                .iter()
                .map(|m| dn(&format!("uid={m},ou=employees,ou=people"))),
        )
}

fn study_cycle(name: &str, members: &[&str]) -> DirectoryEntry {
    DirectoryEntry::new(dn(&format!("cn={name},ou=studycycles")))
        .with_attr("cn", [name])
        .with_attr(
            "member",
            members
                .iter()
                .map(|m| dn(&format!("uid={m},ou=students,ou=people"))),
        )
}

/// Employee without `ou` and student without `memberOf`, as the faculty directory stores them.
fn bare_person(branch: &str, uid: &str, object_class: &str) -> DirectoryEntry {
    DirectoryEntry::new(dn(&format!("uid={uid},ou={branch},ou=people")))
        .with_attr("objectClass", [object_class])
        .with_attr("uid", [uid])
        .with_attr("givenName", ["Ola"])
        .with_attr("sn", ["Lis"])
}

#[test]
fn test_links_resolve_unit_and_cycles_from_group_members() {
    let adapter = adapter();
    let entries = vec![
        employees_group("CS-DEPT", &["jkowalski", "ALIS"]),
        employees_group("MATH", &["jkowalski", "mnowak"]),
        study_cycle("INF-1", &["s1", "s2"]),
        study_cycle("INF-2", &["s1"]),
        bare_person("employees", "jkowalski", "inetOrgPerson"),
        bare_person("students", "s1", "posixAccount"),
    ];

    let links = adapter.links(&entries);
    assert_eq!(links.unit_of("jkowalski"), Some("CS-DEPT"), "the first listing unit wins");
    assert_eq!(links.unit_of("mnowak"), Some("MATH"));
    assert_eq!(links.unit_of("alis"), Some("CS-DEPT"), "usernames match case-insensitively");
    assert_eq!(links.unit_of("s1"), None);
    let cycles: Vec<&str> = links
        .cycles_of("s1")
        .expect("s1 is listed by two cycles")
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(cycles, vec!["INF-1", "INF-2"]);

    let mut employee = adapter.map(&entries[4]).expect("employee maps");
    links.apply(&mut employee);
    let ShadowRecord::Employee(employee) = employee else {
        panic!("expected an employee, got {employee:?}");
    };
    assert_eq!(employee.organizational_unit.as_deref(), Some("CS-DEPT"));

    let mut student = adapter.map(&entries[5]).expect("student maps");
    links.apply(&mut student);
    let ShadowRecord::StudentEnrollment(student) = student else {
        panic!("expected a student, got {student:?}");
    };
    assert_eq!(student.study_cycles.len(), 2);
}

#[test]
fn test_own_attributes_are_used_when_no_group_lists_the_person() {
    let adapter = adapter();
    let links = adapter.links(&[employees_group("MATH", &["mnowak"])]);

    let mut record = adapter.map(&employee("jkowalski", "mgr")).expect("employee maps");
    links.apply(&mut record);
    let ShadowRecord::Employee(e) = record else {
        panic!("expected an employee, got {record:?}");
    };
    assert_eq!(e.organizational_unit.as_deref(), Some("CS-DEPT"), "falls back to ou");

    let mut record = adapter.map(&student("s1001")).expect("student maps");
    links.apply(&mut record);
    let ShadowRecord::StudentEnrollment(s) = record else {
        panic!("expected a student, got {record:?}");
    };
    assert_eq!(s.study_cycles.len(), 2, "memberOf still counts");
}

#[test]
fn test_employees_group_name_is_configurable() {
    let mut config = AdapterConfig::new(BASE);
    config.unit_employees_group = "staff".into();
    let adapter = Adapter::new(config);

    let staff = DirectoryEntry::new(dn("cn=staff,ou=PHYS,ou=units"))
        .with_attr("objectClass", ["groupOfNames"])
        .with_attr("member", [dn("uid=pzielinski,ou=employees,ou=people")]);
    let links = adapter.links(&[staff, employees_group("CS-DEPT", &["jkowalski"])]);

    assert_eq!(links.unit_of("pzielinski"), Some("PHYS"));
    assert_eq!(links.unit_of("jkowalski"), None, "pracownicy is not the configured name");
}
