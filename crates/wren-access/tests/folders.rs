mod common;

use common::{add_member, dashboard, org, project, setup, setup_shared, spreadsheet, thread, user};
use entity::folder;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use wren_access::{
    Error, FolderAccessLevel, FolderAccessRole, FolderType, FolderVisibility, ItemKind, MemberRole,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bootstrap_creates_one_of_each() {
    let env = setup_shared(4).await;
    let (acme, owner) = org(&env, "acme").await;
    let sales = project(&env, acme.id, "sales").await;

    let (project_id, owner_id) = (sales.id, owner.id);
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let folders = env.ctx.folders();
            tokio::spawn(async move { folders.ensure_system_folders(project_id, owner_id).await })
        })
        .collect();
    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("bootstrap task panicked"))
        .collect();

    let first = results[0].as_ref().expect("bootstrap succeeds");
    for r in &results {
        let r = r.as_ref().expect("every racer gets the folders");
        assert_eq!(r.personal.id, first.personal.id);
        assert_eq!(r.public.id, first.public.id);
    }

    let rows = folder::Entity::find()
        .filter(folder::Column::ProjectId.eq(sales.id))
        .all(env.ctx.db())
        .await
        .unwrap();
    assert_eq!(rows.iter().filter(|f| f.r#type == FolderType::Personal).count(), 1);
    assert_eq!(rows.iter().filter(|f| f.r#type == FolderType::Public).count(), 1);
}

#[tokio::test]
async fn test_each_member_gets_a_personal_folder_and_shares_the_public_one() {
    let env = setup().await;
    let folders = env.ctx.folders();
    let (acme, owner) = org(&env, "acme").await;
    let bob = user(&env, "bob@x.com").await;
    add_member(&env, acme.id, bob.id, MemberRole::Member).await;
    let sales = project(&env, acme.id, "sales").await;

    let mine = folders.ensure_system_folders(sales.id, owner.id).await.unwrap();
    let bobs = folders.ensure_system_folders(sales.id, bob.id).await.unwrap();
    assert_ne!(mine.personal.id, bobs.personal.id);
    assert_eq!(mine.public.id, bobs.public.id);
    assert_eq!(bobs.personal.visibility, FolderVisibility::Private);

    // Strangers cannot bootstrap.
    let eve = user(&env, "eve@x.com").await;
    let err = folders.ensure_system_folders(sales.id, eve.id).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
}

#[tokio::test]
async fn test_visibility_rules() {
    let env = setup().await;
    let folders = env.ctx.folders();
    let (acme, owner) = org(&env, "acme").await;
    let bob = user(&env, "bob@x.com").await;
    let carol = user(&env, "carol@x.com").await;
    let eve = user(&env, "eve@x.com").await;
    add_member(&env, acme.id, bob.id, MemberRole::Member).await;
    add_member(&env, acme.id, carol.id, MemberRole::Member).await;
    let sales = project(&env, acme.id, "sales").await;

    let system = folders.ensure_system_folders(sales.id, owner.id).await.unwrap();
    let private = folders
        .create_folder(sales.id, owner.id, "Drafts", FolderVisibility::Private)
        .await
        .unwrap();
    let shared = folders
        .create_folder(sales.id, owner.id, "Team", FolderVisibility::Shared)
        .await
        .unwrap();

    // Owner writes everything they own.
    for f in [&system.personal, &private, &shared] {
        assert_eq!(folders.access_for(f.id, owner.id).await.unwrap(), FolderAccessLevel::Write);
    }

    // Members read public and shared folders, nothing private.
    assert_eq!(folders.access_for(system.public.id, bob.id).await.unwrap(), FolderAccessLevel::Read);
    assert_eq!(folders.access_for(shared.id, bob.id).await.unwrap(), FolderAccessLevel::Read);
    assert_eq!(folders.access_for(private.id, bob.id).await.unwrap(), FolderAccessLevel::None);
    assert_eq!(
        folders.access_for(system.personal.id, bob.id).await.unwrap(),
        FolderAccessLevel::None
    );

    // Grants open private folders.
    folders.grant_access(private.id, bob.id, FolderAccessRole::Viewer).await.unwrap();
    folders.grant_access(private.id, carol.id, FolderAccessRole::Editor).await.unwrap();
    assert_eq!(folders.access_for(private.id, bob.id).await.unwrap(), FolderAccessLevel::Read);
    assert_eq!(folders.access_for(private.id, carol.id).await.unwrap(), FolderAccessLevel::Write);

    // Non-members see nothing, public included.
    assert_eq!(folders.access_for(system.public.id, eve.id).await.unwrap(), FolderAccessLevel::None);
    assert!(folders.list_accessible_folders(sales.id, eve.id).await.unwrap().is_empty());

    let visible: Vec<i32> = folders
        .list_accessible_folders(sales.id, bob.id)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.folder.id)
        .collect();
    assert!(visible.contains(&system.public.id));
    assert!(visible.contains(&private.id));
    assert!(visible.contains(&shared.id));
    assert!(!visible.contains(&system.personal.id));
}

#[tokio::test]
async fn test_grant_rules() {
    let env = setup().await;
    let folders = env.ctx.folders();
    let (acme, owner) = org(&env, "acme").await;
    let bob = user(&env, "bob@x.com").await;
    let eve = user(&env, "eve@x.com").await;
    add_member(&env, acme.id, bob.id, MemberRole::Member).await;
    let sales = project(&env, acme.id, "sales").await;
    let system = folders.ensure_system_folders(sales.id, owner.id).await.unwrap();
    let custom = folders
        .create_folder(sales.id, owner.id, "Drafts", FolderVisibility::Private)
        .await
        .unwrap();

    let err = folders
        .grant_access(system.personal.id, bob.id, FolderAccessRole::Viewer)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));

    let err = folders.grant_access(custom.id, owner.id, FolderAccessRole::Viewer).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = folders.grant_access(custom.id, eve.id, FolderAccessRole::Viewer).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // Granting again changes the role in place.
    folders.grant_access(custom.id, bob.id, FolderAccessRole::Viewer).await.unwrap();
    let upgraded = folders.grant_access(custom.id, bob.id, FolderAccessRole::Editor).await.unwrap();
    assert_eq!(upgraded.role, FolderAccessRole::Editor);
    assert_eq!(folders.list_access(custom.id).await.unwrap().len(), 1);

    folders.revoke_access(custom.id, bob.id).await.unwrap();
    assert!(folders.list_access(custom.id).await.unwrap().is_empty());
    assert!(matches!(
        folders.revoke_access(custom.id, bob.id).await.unwrap_err(),
        Error::NotFound { .. }
    ));
}

#[tokio::test]
async fn test_system_folders_are_protected() {
    let env = setup().await;
    let folders = env.ctx.folders();
    let (acme, owner) = org(&env, "acme").await;
    let sales = project(&env, acme.id, "sales").await;
    let system = folders.ensure_system_folders(sales.id, owner.id).await.unwrap();

    for id in [system.personal.id, system.public.id] {
        assert!(matches!(
            folders.rename_folder(id, "Mine").await.unwrap_err(),
            Error::InvariantViolation(_)
        ));
        assert!(matches!(
            folders.delete_folder(id).await.unwrap_err(),
            Error::InvariantViolation(_)
        ));
        assert!(matches!(
            folders.set_visibility(id, FolderVisibility::Shared).await.unwrap_err(),
            Error::InvariantViolation(_)
        ));
    }
}

#[tokio::test]
async fn test_delete_folder_unorganizes_items_and_drops_grants() {
    let env = setup().await;
    let folders = env.ctx.folders();
    let (acme, owner) = org(&env, "acme").await;
    let bob = user(&env, "bob@x.com").await;
    add_member(&env, acme.id, bob.id, MemberRole::Member).await;
    let sales = project(&env, acme.id, "sales").await;

    let custom = folders
        .create_folder(sales.id, owner.id, "Q3", FolderVisibility::Shared)
        .await
        .unwrap();
    folders.grant_access(custom.id, bob.id, FolderAccessRole::Editor).await.unwrap();

    let d = dashboard(&env, sales.id, "revenue").await;
    let t = thread(&env, sales.id, "why churn").await;
    let s = spreadsheet(&env, sales.id, "pipeline").await;
    for (kind, id) in [(ItemKind::Dashboard, d.id), (ItemKind::Thread, t.id), (ItemKind::Spreadsheet, s.id)] {
        folders.move_item_to_folder(kind, id, Some(custom.id)).await.unwrap();
        assert_eq!(folders.item_location(kind, id).await.unwrap().folder_id, Some(custom.id));
    }

    folders.delete_folder(custom.id).await.unwrap();

    for (kind, id) in [(ItemKind::Dashboard, d.id), (ItemKind::Thread, t.id), (ItemKind::Spreadsheet, s.id)] {
        assert_eq!(folders.item_location(kind, id).await.unwrap().folder_id, None);
    }
    assert!(matches!(folders.get_folder(custom.id).await.unwrap_err(), Error::NotFound { .. }));
    assert!(matches!(folders.list_access(custom.id).await.unwrap_err(), Error::NotFound { .. }));
}

#[tokio::test]
async fn test_move_item_stays_within_its_project() {
    let env = setup().await;
    let folders = env.ctx.folders();
    let (acme, owner) = org(&env, "acme").await;
    let sales = project(&env, acme.id, "sales").await;
    let ops = project(&env, acme.id, "ops").await;
    let elsewhere = folders
        .create_folder(ops.id, owner.id, "Ops", FolderVisibility::Shared)
        .await
        .unwrap();
    let d = dashboard(&env, sales.id, "revenue").await;

    let err = folders
        .move_item_to_folder(ItemKind::Dashboard, d.id, Some(elsewhere.id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = folders
        .move_item_to_folder(ItemKind::Thread, 9_999, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_reorder_is_contiguous_from_zero() {
    let env = setup().await;
    let folders = env.ctx.folders();
    let (acme, owner) = org(&env, "acme").await;
    let sales = project(&env, acme.id, "sales").await;

    let a = folders.create_folder(sales.id, owner.id, "A", FolderVisibility::Shared).await.unwrap();
    let b = folders.create_folder(sales.id, owner.id, "B", FolderVisibility::Shared).await.unwrap();
    let c = folders.create_folder(sales.id, owner.id, "C", FolderVisibility::Shared).await.unwrap();
    assert_eq!((a.sort_order, b.sort_order, c.sort_order), (0, 1, 2));

    let reordered = folders.reorder_folders(sales.id, &[c.id, a.id]).await.unwrap();
    let ids: Vec<i32> = reordered.iter().map(|f| f.id).collect();
    let orders: Vec<i32> = reordered.iter().map(|f| f.sort_order).collect();
    assert_eq!(ids, vec![c.id, a.id, b.id]);
    assert_eq!(orders, vec![0, 1, 2]);

    let listed: Vec<i32> = folders
        .list_accessible_folders(sales.id, owner.id)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.folder.id)
        .collect();
    assert_eq!(listed, ids);

    assert!(matches!(
        folders.reorder_folders(sales.id, &[a.id, a.id]).await.unwrap_err(),
        Error::Validation(_)
    ));
    assert!(matches!(
        folders.reorder_folders(sales.id, &[9_999]).await.unwrap_err(),
        Error::NotFound { .. }
    ));
}

#[tokio::test]
async fn test_rename_and_reshare_custom_folder() {
    let env = setup().await;
    let folders = env.ctx.folders();
    let (acme, owner) = org(&env, "acme").await;
    let bob = user(&env, "bob@x.com").await;
    add_member(&env, acme.id, bob.id, MemberRole::Member).await;
    let sales = project(&env, acme.id, "sales").await;
    let f = folders
        .create_folder(sales.id, owner.id, "Drafts", FolderVisibility::Private)
        .await
        .unwrap();

    let renamed = folders.rename_folder(f.id, "  Final  ").await.unwrap();
    assert_eq!(renamed.name, "Final");
    assert!(matches!(
        folders.rename_folder(f.id, "   ").await.unwrap_err(),
        Error::Validation(_)
    ));

    assert_eq!(folders.access_for(f.id, bob.id).await.unwrap(), FolderAccessLevel::None);
    folders.set_visibility(f.id, FolderVisibility::Shared).await.unwrap();
    assert_eq!(folders.access_for(f.id, bob.id).await.unwrap(), FolderAccessLevel::Read);
}
