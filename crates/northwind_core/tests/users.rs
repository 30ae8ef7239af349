mod common;

use common::{grant_role, insert_user, repo_for};
use uuid::Uuid;

#[test]
fn user_partials_expose_only_names() {
    let mine = Uuid::new_v4();
    let repo = repo_for(mine);
    let conn = repo.provider().connection();
    insert_user(conn, "admin", Some("admin@northwind.test"), None);
    insert_user(conn, "mine", None, Some(mine));
    insert_user(conn, "theirs", None, Some(Uuid::new_v4()));

    let users = repo.load(&repo.user_partials()).unwrap();
    let names: Vec<&str> = users.iter().map(|user| user.user_name.as_str()).collect();
    assert_eq!(names, ["admin", "mine"]);

    let json = serde_json::to_value(&users[0]).unwrap();
    let object = json.as_object().unwrap();
    assert!(object.contains_key("UserName"));
    assert!(!object.contains_key("Email"));
    assert!(!object.contains_key("Roles"));
}

#[test]
fn get_user_by_id_adds_email_and_sorted_roles() {
    let repo = repo_for(Uuid::new_v4());
    let conn = repo.provider().connection();
    let id = insert_user(conn, "nancy", Some("nancy@northwind.test"), None);
    grant_role(conn, id, "Sales");
    grant_role(conn, id, "Admin");

    let user = repo.get_user_by_id(id).unwrap().unwrap();
    assert_eq!(user.id, id);
    assert_eq!(user.email.as_deref(), Some("nancy@northwind.test"));
    assert_eq!(
        user.roles,
        Some(vec!["Admin".to_string(), "Sales".to_string()])
    );
}

#[test]
fn get_user_by_id_returns_empty_roles_for_user_without_roles() {
    let repo = repo_for(Uuid::new_v4());
    let id = insert_user(repo.provider().connection(), "guest", None, None);

    let user = repo.get_user_by_id(id).unwrap().unwrap();
    assert_eq!(user.email, None);
    assert_eq!(user.roles, Some(Vec::new()));
}

#[test]
fn get_user_by_id_returns_none_for_missing_or_hidden_users() {
    let repo = repo_for(Uuid::new_v4());
    let hidden = insert_user(
        repo.provider().connection(),
        "hidden",
        None,
        Some(Uuid::new_v4()),
    );

    assert!(repo.get_user_by_id(hidden).unwrap().is_none());
    assert!(repo.get_user_by_id(9_999).unwrap().is_none());
}
