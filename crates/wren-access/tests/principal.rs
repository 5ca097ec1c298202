mod common;

use common::{add_member, dashboard, org, project, setup, thread, user, PASSWORD};
use wren_access::{
    Action, Actor, Credential, Error, FolderAccessRole, FolderVisibility, ItemKind, MemberRole, NewApiKey,
    Permission, Permissions, Principal, Resource, Scope,
};

fn key_request(created_by: i32, permissions: Option<Permissions>) -> NewApiKey {
    NewApiKey {
        name: "integration".into(),
        permissions,
        expires_at: None,
        created_by,
    }
}

#[tokio::test]
async fn test_authenticate_session_and_bearer_forms() {
    let env = setup().await;
    let gate = env.ctx.gatekeeper();
    let (acme, owner) = org(&env, "acme").await;
    let sales = project(&env, acme.id, "sales").await;

    let session = env.ctx.credentials().create_session(owner.id).await.unwrap();
    for cred in [
        Credential::Session(session.token.clone()),
        Credential::Bearer(session.token.clone()),
    ] {
        let p = gate.authenticate(&cred).await.unwrap();
        assert_eq!(p.actor, Actor::User { user_id: owner.id });
        assert_eq!(p.scope, Scope::User);
    }

    let osk = env.ctx.org_keys().issue(acme.id, key_request(owner.id, None)).await.unwrap();
    let p = gate.authenticate(&Credential::Bearer(osk.secret.clone())).await.unwrap();
    assert_eq!(p.scope, Scope::Organization { organization_id: acme.id });
    assert_eq!(p.user_id(), owner.id);

    let psk = env
        .ctx
        .project_keys()
        .issue(sales.id, key_request(owner.id, None))
        .await
        .unwrap();
    let p = gate.authenticate(&Credential::ApiKey(psk.secret.clone())).await.unwrap();
    assert_eq!(
        p.scope,
        Scope::Project {
            organization_id: acme.id,
            project_id: sales.id
        }
    );
    assert!(matches!(p.actor, Actor::ApiKey { key_id, .. } if key_id == psk.record.id));
}

#[tokio::test]
async fn test_invalid_credentials_fail_uniformly() {
    let env = setup().await;
    let gate = env.ctx.gatekeeper();
    let (_acme, owner) = org(&env, "acme").await;
    let session = env.ctx.credentials().create_session(owner.id).await.unwrap();

    let bad = [
        Credential::Session("nope".into()),
        Credential::Bearer("".into()),
        Credential::Bearer("osk-0000".into()),
        Credential::ApiKey("sk-something".into()),
        // A session token is not an API key.
        Credential::ApiKey(session.token.clone()),
    ];
    for cred in bad {
        let err = gate.authenticate(&cred).await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredential), "{cred:?} gave {err:?}");
    }

    env.ctx.credentials().invalidate_session(&session.token).await.unwrap();
    assert!(gate
        .authenticate(&Credential::Session(session.token))
        .await
        .unwrap_err()
        .is_auth_failure());
}

#[tokio::test]
async fn test_organization_and_project_roles() {
    let env = setup().await;
    let gate = env.ctx.gatekeeper();
    let (acme, owner) = org(&env, "acme").await;
    let (globex, _) = org(&env, "globex").await;
    let bob = user(&env, "bob@x.com").await;
    add_member(&env, acme.id, bob.id, MemberRole::Member).await;
    let sales = project(&env, acme.id, "sales").await;

    let as_user = |user_id| Principal {
        actor: Actor::User { user_id },
        scope: Scope::User,
    };
    let allowed = |p: Principal, r: Resource, a: Action| {
        let gate = gate.clone();
        async move { gate.authorize(&p, r, a).await.unwrap().is_allowed() }
    };

    assert!(allowed(as_user(owner.id), Resource::Organization(acme.id), Action::Administer).await);
    assert!(allowed(as_user(bob.id), Resource::Organization(acme.id), Action::Read).await);
    assert!(!allowed(as_user(bob.id), Resource::Organization(acme.id), Action::Write).await);
    assert!(!allowed(as_user(bob.id), Resource::Organization(globex.id), Action::Read).await);

    assert!(allowed(as_user(bob.id), Resource::Project(sales.id), Action::Write).await);
    assert!(!allowed(as_user(bob.id), Resource::Project(sales.id), Action::Administer).await);
    assert!(allowed(as_user(owner.id), Resource::Project(sales.id), Action::Administer).await);

    // Unknown ids deny instead of erroring.
    assert!(!allowed(as_user(owner.id), Resource::Project(9_999), Action::Read).await);
    assert!(!allowed(as_user(owner.id), Resource::Folder(9_999), Action::Read).await);
    assert!(!allowed(as_user(owner.id), Resource::Item(ItemKind::Dashboard, 9_999), Action::Read).await);
}

#[tokio::test]
async fn test_api_key_scope_and_permissions() {
    let env = setup().await;
    let gate = env.ctx.gatekeeper();
    let (acme, owner) = org(&env, "acme").await;
    let sales = project(&env, acme.id, "sales").await;
    let ops = project(&env, acme.id, "ops").await;

    let read_only = Permissions::new([Permission::ProjectsRead]).unwrap();
    let psk = env
        .ctx
        .project_keys()
        .issue(sales.id, key_request(owner.id, Some(read_only)))
        .await
        .unwrap();
    let key = gate.authenticate(&Credential::Bearer(psk.secret)).await.unwrap();

    let check = |r: Resource, a: Action| {
        let gate = gate.clone();
        let key = key.clone();
        async move { gate.authorize(&key, r, a).await.unwrap().is_allowed() }
    };

    assert!(check(Resource::Project(sales.id), Action::Read).await);
    assert!(!check(Resource::Project(sales.id), Action::Write).await);
    assert!(!check(Resource::Project(ops.id), Action::Read).await, "project key is bound to its project");
    assert!(!check(Resource::Organization(acme.id), Action::Read).await);

    let osk = env
        .ctx
        .org_keys()
        .issue(acme.id, key_request(owner.id, None))
        .await
        .unwrap();
    let org_key = gate.authenticate(&Credential::Bearer(osk.secret)).await.unwrap();
    assert!(gate
        .authorize(&org_key, Resource::Project(ops.id), Action::Write)
        .await
        .unwrap()
        .is_allowed());
    assert!(!gate
        .authorize(&org_key, Resource::Organization(acme.id), Action::Administer)
        .await
        .unwrap()
        .is_allowed());
}

#[tokio::test]
async fn test_folder_and_item_decisions() {
    let env = setup().await;
    let gate = env.ctx.gatekeeper();
    let folders = env.ctx.folders();
    let (acme, owner) = org(&env, "acme").await;
    let bob = user(&env, "bob@x.com").await;
    add_member(&env, acme.id, bob.id, MemberRole::Member).await;
    let sales = project(&env, acme.id, "sales").await;

    let system = folders.ensure_system_folders(sales.id, owner.id).await.unwrap();
    let drafts = folders
        .create_folder(sales.id, owner.id, "Drafts", FolderVisibility::Private)
        .await
        .unwrap();
    let report = dashboard(&env, sales.id, "report").await;
    folders
        .move_item_to_folder(ItemKind::Dashboard, report.id, Some(drafts.id))
        .await
        .unwrap();

    let (_, bob_session) = env.ctx.credentials().login("bob@x.com", PASSWORD).await.unwrap();
    let bob_p = gate.authenticate(&Credential::Session(bob_session.token)).await.unwrap();
    let item = Resource::Item(ItemKind::Dashboard, report.id);

    assert!(!gate.authorize(&bob_p, item, Action::Read).await.unwrap().is_allowed());
    assert!(!gate
        .authorize(&bob_p, Resource::Folder(system.personal.id), Action::Read)
        .await
        .unwrap()
        .is_allowed());
    assert!(gate
        .authorize(&bob_p, Resource::Folder(system.public.id), Action::Read)
        .await
        .unwrap()
        .is_allowed());

    folders.grant_access(drafts.id, bob.id, FolderAccessRole::Editor).await.unwrap();
    assert!(gate.authorize(&bob_p, item, Action::Write).await.unwrap().is_allowed());
    assert!(!gate
        .authorize(&bob_p, Resource::Folder(drafts.id), Action::Administer)
        .await
        .unwrap()
        .is_allowed());

    // Org owners administer any folder in their projects.
    let owner_p = Principal {
        actor: Actor::User { user_id: owner.id },
        scope: Scope::User,
    };
    assert!(gate
        .authorize(&owner_p, Resource::Folder(drafts.id), Action::Administer)
        .await
        .unwrap()
        .is_allowed());

    // Keys never see private folders, even their creator's.
    let osk = env
        .ctx
        .org_keys()
        .issue(acme.id, key_request(owner.id, None))
        .await
        .unwrap();
    let key = gate.authenticate(&Credential::Bearer(osk.secret)).await.unwrap();
    assert!(!gate.authorize(&key, item, Action::Read).await.unwrap().is_allowed());
    assert!(gate
        .authorize(&key, Resource::Folder(system.public.id), Action::Read)
        .await
        .unwrap()
        .is_allowed());
}

#[tokio::test]
async fn test_threads_need_thread_permissions_for_keys() {
    let env = setup().await;
    let gate = env.ctx.gatekeeper();
    let (acme, owner) = org(&env, "acme").await;
    let sales = project(&env, acme.id, "sales").await;
    let chat = thread(&env, sales.id, "q3 numbers").await;
    let item = Resource::Item(ItemKind::Thread, chat.id);

    let projects_only = Permissions::new([Permission::ProjectsWrite]).unwrap();
    let issued = env
        .ctx
        .project_keys()
        .issue(sales.id, key_request(owner.id, Some(projects_only)))
        .await
        .unwrap();
    let key = gate.authenticate(&Credential::Bearer(issued.secret)).await.unwrap();
    assert!(!gate.authorize(&key, item, Action::Read).await.unwrap().is_allowed());

    let with_threads = Permissions::new([Permission::ProjectsRead, Permission::ThreadsRead]).unwrap();
    let issued = env
        .ctx
        .project_keys()
        .issue(sales.id, key_request(owner.id, Some(with_threads)))
        .await
        .unwrap();
    let key = gate.authenticate(&Credential::Bearer(issued.secret)).await.unwrap();
    assert!(gate.authorize(&key, item, Action::Read).await.unwrap().is_allowed());
    assert!(!gate.authorize(&key, item, Action::Write).await.unwrap().is_allowed());
}
