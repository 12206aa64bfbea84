use ldapsync::directory::{FileDirectory, LdapDirectory};
use ldapsync::load_config::LdapSettings;
use ldapsync::store::FileRepository;
use ldapsync_core::contract::{DirectorySource, Repository};
use ldapsync_core::error::{DirectoryError, RepoError};
use ldapsync_core::record::{fields, AuthoritativeRecord, EntityKind, FieldChange, FieldValue};
use std::collections::BTreeMap;
use std::fs::write;
use std::time::Duration;
use tempfile::tempdir;

fn unit(short_name: &str, name: &str) -> AuthoritativeRecord {
    AuthoritativeRecord {
        kind: EntityKind::OrganizationalUnit,
        external_id: short_name.into(),
        fields: BTreeMap::from([(fields::NAME.to_string(), FieldValue::text(name))]),
    }
}

#[tokio::test]
async fn test_file_repository_persists_every_mutation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.json");

    let store = FileRepository::open(&path).expect("missing store opens empty");
    assert!(store.list_ids(EntityKind::OrganizationalUnit).await.unwrap().is_empty());

    store.create(&unit("CS-DEPT", "Computer Science")).await.unwrap();
    store.create(&unit("MATH", "Mathematics")).await.unwrap();
    let change = FieldChange {
        field: fields::NAME.to_string(),
        before: FieldValue::text("Computer Science"),
        after: FieldValue::text("Department of Computer Science"),
    };
    store
        .update(&unit("CS-DEPT", "Department of Computer Science"), &[change])
        .await
        .unwrap();
    store.delete(&unit("MATH", "Mathematics")).await.unwrap();

    let reopened = FileRepository::open(&path).expect("store reopens");
    assert_eq!(
        reopened.list_ids(EntityKind::OrganizationalUnit).await.unwrap(),
        vec!["CS-DEPT".to_string()]
    );
    let stored = reopened
        .find(EntityKind::OrganizationalUnit, "CS-DEPT")
        .await
        .unwrap()
        .expect("record persisted");
    assert_eq!(
        stored.field(fields::NAME).as_text(),
        Some("Department of Computer Science")
    );
}

#[tokio::test]
async fn test_file_repository_rejections_leave_state_unchanged() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.json");
    let store = FileRepository::open(&path).unwrap();
    store.create(&unit("CS-DEPT", "Computer Science")).await.unwrap();

    let duplicate = store.create(&unit("CS-DEPT", "Other")).await.unwrap_err();
    assert!(matches!(duplicate, RepoError::Rejected { .. }), "got {duplicate:?}");

    let missing = store.delete(&unit("PHYS", "Physics")).await.unwrap_err();
    assert!(matches!(missing, RepoError::Rejected { .. }), "got {missing:?}");

    let reopened = FileRepository::open(&path).unwrap();
    assert_eq!(
        reopened.records(EntityKind::OrganizationalUnit),
        vec![unit("CS-DEPT", "Computer Science")]
    );
}

#[test]
fn test_file_repository_refuses_garbled_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.json");
    write(&path, "{ not json").unwrap();

    let err = FileRepository::open(&path).err().expect("garbled store must not open");
    assert!(err.is_unavailable(), "got {err:?}");
}

#[tokio::test]
async fn test_file_directory_reads_single_and_multi_valued_attributes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("directory.yaml");
    write(
        &path,
        r#"
- dn: cn=INF-1,ou=studycycles,ou=FCS,o=BUT,c=pl
  attributes:
    cn: INF-1
    member:
      - uid=s1,ou=students,ou=people,ou=FCS,o=BUT,c=pl
      - uid=s2,ou=students,ou=people,ou=FCS,o=BUT,c=pl
- dn: ou=units,ou=FCS,o=BUT,c=pl
"#,
    )
    .unwrap();

    let entries = FileDirectory::new(&path).fetch_all().await.expect("snapshot loads");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].first("cn"), Some("INF-1"));
    assert_eq!(entries[0].values("member").len(), 2);
    assert!(entries[1].attributes.is_empty());
}

#[tokio::test]
async fn test_file_directory_errors() {
    let dir = tempdir().unwrap();

    let missing = FileDirectory::new(dir.path().join("absent.yaml"))
        .fetch_all()
        .await
        .unwrap_err();
    assert!(matches!(missing, DirectoryError::Unavailable { .. }), "got {missing:?}");

    let path = dir.path().join("garbled.yaml");
    write(&path, "dn: [this is not a list of entries").unwrap();
    let garbled = FileDirectory::new(&path).fetch_all().await.unwrap_err();
    assert!(matches!(garbled, DirectoryError::Malformed { .. }), "got {garbled:?}");
}

#[test]
fn test_ldap_search_bases_are_joined_onto_base_dn() {
    let settings: LdapSettings = serde_yaml::from_str(
        "url: ldap://localhost:389\nsearches: [ou=units, '']\n",
    )
    .unwrap();
    let directory = LdapDirectory::new(settings, "ou=FCS,o=BUT,c=pl", Duration::from_secs(5));
    assert_eq!(
        directory.search_bases(),
        vec!["ou=units,ou=FCS,o=BUT,c=pl", "ou=FCS,o=BUT,c=pl"]
    );
}

#[tokio::test]
async fn test_unreachable_ldap_server_is_unavailable() {
    let settings: LdapSettings = serde_yaml::from_str("url: ldap://127.0.0.1:1\n").unwrap();
    let directory = LdapDirectory::new(settings, "dc=example,dc=org", Duration::from_secs(2));

    let err = directory.fetch_all().await.unwrap_err();
    assert!(matches!(err, DirectoryError::Unavailable { .. }), "got {err:?}");
}
