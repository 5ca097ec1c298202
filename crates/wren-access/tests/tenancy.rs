mod common;

use common::{add_member, org, setup, setup_shared, user, DAY};
use wren_access::{Error, MemberRole, OrganizationUpdate};

#[tokio::test]
async fn test_acme_invites_bob_and_bob_accepts_before_expiry() {
    let env = setup().await;
    let tenancy = env.ctx.tenancy();
    let (acme, owner) = org(&env, "acme").await;
    let bob = user(&env, "bob@x.com").await;

    let inv = tenancy
        .invite_member(acme.id, "bob@x.com", MemberRole::Member, owner.id, Some(DAY))
        .await
        .unwrap();
    assert_eq!(inv.expires_at, common::START + DAY);

    env.clock.advance(DAY - 60);
    let member = tenancy.accept_invitation(&inv.token, bob.id).await.unwrap();
    assert_eq!(member.organization_id, acme.id);
    assert_eq!(member.user_id, bob.id);
    assert_eq!(member.role, MemberRole::Member);
    assert_eq!(member.invited_by, Some(owner.id));
}

#[tokio::test]
async fn test_acceptance_after_expiry_fails_as_expired() {
    let env = setup().await;
    let tenancy = env.ctx.tenancy();
    let (acme, owner) = org(&env, "acme").await;
    let bob = user(&env, "bob@x.com").await;

    let inv = tenancy
        .invite_member(acme.id, "bob@x.com", MemberRole::Member, owner.id, Some(DAY))
        .await
        .unwrap();

    env.clock.advance(DAY + 1);
    let err = tenancy.accept_invitation(&inv.token, bob.id).await.unwrap_err();
    assert!(matches!(err, Error::Expired { .. }), "got {err:?}");
    assert!(tenancy.get_member(acme.id, bob.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_double_accept_creates_one_member() {
    let env = setup().await;
    let tenancy = env.ctx.tenancy();
    let (acme, owner) = org(&env, "acme").await;
    let bob = user(&env, "bob@x.com").await;
    let inv = tenancy
        .invite_member(acme.id, "bob@x.com", MemberRole::Admin, owner.id, None)
        .await
        .unwrap();

    tenancy.accept_invitation(&inv.token, bob.id).await.unwrap();
    let err = tenancy.accept_invitation(&inv.token, bob.id).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "got {err:?}");

    let members = tenancy.list_members(acme.id).await.unwrap();
    assert_eq!(members.iter().filter(|m| m.user_id == bob.id).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_only_one_wins() {
    let env = setup_shared(4).await;
    let tenancy = env.ctx.tenancy();
    let (acme, owner) = org(&env, "acme").await;
    let bob = user(&env, "bob@x.com").await;
    let inv = tenancy
        .invite_member(acme.id, "bob@x.com", MemberRole::Member, owner.id, None)
        .await
        .unwrap();

    let bob_id = bob.id;
    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let tenancy = env.ctx.tenancy();
            let token = inv.token.clone();
            tokio::spawn(async move { tenancy.accept_invitation(&token, bob_id).await })
        })
        .collect();
    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("accept task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "results: {results:?}");
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        // Losers see the claimed invitation, or SQLite refuses their write.
        assert!(matches!(err, Error::Conflict(_) | Error::Store(_)), "got {err:?}");
    }
    let members = tenancy.list_members(acme.id).await.unwrap();
    assert_eq!(members.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_owner_demotions_keep_an_owner() {
    let env = setup_shared(4).await;
    let tenancy = env.ctx.tenancy();
    let (acme, alice) = org(&env, "acme").await;
    let bob = user(&env, "bob@x.com").await;
    add_member(&env, acme.id, bob.id, MemberRole::Owner).await;

    let org_id = acme.id;
    let demote = |user_id: i32| {
        let tenancy = env.ctx.tenancy();
        tokio::spawn(async move { tenancy.change_role(org_id, user_id, MemberRole::Admin).await })
    };
    let (a, b) = tokio::join!(demote(alice.id), demote(bob.id));
    let results = [a.expect("demote task panicked"), b.expect("demote task panicked")];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "results: {results:?}");
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, Error::InvariantViolation(_) | Error::Store(_)), "got {err:?}");
    }
    let owners = tenancy
        .list_members(acme.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.role == MemberRole::Owner)
        .count();
    assert_eq!(owners, 1);
}

#[tokio::test]
async fn test_invitation_rules() {
    let env = setup().await;
    let tenancy = env.ctx.tenancy();
    let (acme, owner) = org(&env, "acme").await;
    let carol = user(&env, "carol@x.com").await;
    add_member(&env, acme.id, carol.id, MemberRole::Member).await;

    // Already a member.
    let err = tenancy
        .invite_member(acme.id, "Carol@X.com", MemberRole::Member, owner.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // Plain members cannot invite.
    let err = tenancy
        .invite_member(acme.id, "dave@x.com", MemberRole::Member, carol.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    // Unknown token.
    let err = tenancy.accept_invitation("no-such-token", carol.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_invitation_is_bound_to_its_email() {
    let env = setup().await;
    let tenancy = env.ctx.tenancy();
    let (acme, owner) = org(&env, "acme").await;
    let mallory = user(&env, "mallory@x.com").await;

    let inv = tenancy
        .invite_member(acme.id, "bob@x.com", MemberRole::Member, owner.id, None)
        .await
        .unwrap();
    let err = tenancy.accept_invitation(&inv.token, mallory.id).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    let pending = tenancy.list_pending_invitations(acme.id).await.unwrap();
    assert_eq!(pending.len(), 1, "a rejected accept must not consume the invitation");
}

#[tokio::test]
async fn test_pending_invitations_and_revocation() {
    let env = setup().await;
    let tenancy = env.ctx.tenancy();
    let (acme, owner) = org(&env, "acme").await;

    let short = tenancy
        .invite_member(acme.id, "a@x.com", MemberRole::Member, owner.id, Some(60))
        .await
        .unwrap();
    let long = tenancy
        .invite_member(acme.id, "b@x.com", MemberRole::Member, owner.id, None)
        .await
        .unwrap();

    env.clock.advance(120);
    let pending: Vec<i32> = tenancy
        .list_pending_invitations(acme.id)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(pending, vec![long.id]);

    tenancy.revoke_invitation(long.id).await.unwrap();
    assert!(tenancy.list_pending_invitations(acme.id).await.unwrap().is_empty());
    let err = tenancy.revoke_invitation(long.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    // The expired one can still be revoked.
    tenancy.revoke_invitation(short.id).await.unwrap();
}

#[tokio::test]
async fn test_sole_owner_cannot_be_demoted_or_removed() {
    let env = setup().await;
    let tenancy = env.ctx.tenancy();
    let (acme, owner) = org(&env, "acme").await;
    let bob = user(&env, "bob@x.com").await;
    add_member(&env, acme.id, bob.id, MemberRole::Member).await;
    let before = tenancy.list_members(acme.id).await.unwrap();

    let err = tenancy
        .change_role(acme.id, owner.id, MemberRole::Admin)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)), "got {err:?}");

    let err = tenancy.remove_member(acme.id, owner.id).await.unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)), "got {err:?}");

    assert_eq!(tenancy.list_members(acme.id).await.unwrap(), before);
}

#[tokio::test]
async fn test_owner_can_step_down_once_another_owner_exists() {
    let env = setup().await;
    let tenancy = env.ctx.tenancy();
    let (acme, owner) = org(&env, "acme").await;
    let bob = user(&env, "bob@x.com").await;
    add_member(&env, acme.id, bob.id, MemberRole::Member).await;

    tenancy.change_role(acme.id, bob.id, MemberRole::Owner).await.unwrap();
    let demoted = tenancy
        .change_role(acme.id, owner.id, MemberRole::Member)
        .await
        .unwrap();
    assert_eq!(demoted.role, MemberRole::Member);

    tenancy.remove_member(acme.id, owner.id).await.unwrap();
    let members = tenancy.list_members(acme.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, bob.id);
    assert_eq!(members[0].role, MemberRole::Owner);
}

#[tokio::test]
async fn test_organization_crud() {
    let env = setup().await;
    let tenancy = env.ctx.tenancy();
    let (acme, owner) = org(&env, "acme").await;

    let err = tenancy
        .create_organization("Other", "acme", None, owner.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let err = tenancy
        .create_organization("Bad", "Not A Slug", None, owner.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let updated = tenancy
        .update_organization(
            acme.id,
            OrganizationUpdate {
                display_name: Some("Acme Inc".into()),
                slug: Some("acme-inc".into()),
                logo_url: Some(Some("https://acme.test/logo.png".into())),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.slug, "acme-inc");

    let by_slug = tenancy.get_organization_by_slug("acme-inc").await.unwrap();
    assert_eq!(by_slug.map(|o| o.id), Some(acme.id));
    assert!(tenancy.get_organization_by_slug("acme").await.unwrap().is_none());

    let orgs = tenancy.list_user_organizations(owner.id).await.unwrap();
    assert_eq!(orgs.len(), 1);
    assert_eq!(orgs[0].role, MemberRole::Owner);

    tenancy.delete_organization(acme.id).await.unwrap();
    assert!(tenancy.list_members(acme.id).await.unwrap().is_empty());
    assert!(matches!(
        tenancy.get_organization(acme.id).await.unwrap_err(),
        Error::NotFound { .. }
    ));
}

#[tokio::test]
async fn test_require_role() {
    let env = setup().await;
    let tenancy = env.ctx.tenancy();
    let (acme, owner) = org(&env, "acme").await;
    let bob = user(&env, "bob@x.com").await;
    add_member(&env, acme.id, bob.id, MemberRole::Member).await;
    let admins = [MemberRole::Owner, MemberRole::Admin];

    assert!(tenancy.require_role(acme.id, owner.id, &admins).await.is_ok());
    assert!(matches!(
        tenancy.require_role(acme.id, bob.id, &admins).await.unwrap_err(),
        Error::Forbidden(_)
    ));

    let stranger = user(&env, "eve@x.com").await;
    assert!(tenancy.require_role(acme.id, stranger.id, &admins).await.is_err());
}
