//! Shared fixtures for integration tests.
//!
//! Each test gets its own in-memory SQLite database, migrated from scratch,
//! and a manual clock starting at [`START`]. Race tests use
//! [`setup_shared`], a file database behind a multi-connection pool.

#![allow(dead_code)]

use std::sync::Arc;

use sea_orm::{ActiveModelTrait, Set};
use tempfile::TempDir;

use entity::member::{self, MemberRole};
use entity::{dashboard, organization, project, spreadsheet, thread, user};
use wren_access::{AccessConfig, AccessContext, ManualClock};

/// 2026-01-01T00:00:00Z
pub const START: i64 = 1_767_225_600;
pub const PASSWORD: &str = "correct horse battery";
pub const DAY: i64 = 24 * 60 * 60;

pub struct TestEnv {
    pub ctx: AccessContext,
    pub clock: Arc<ManualClock>,
    // Holds the database file of a shared env until the test ends.
    _dir: Option<TempDir>,
}

pub async fn setup() -> TestEnv {
    connect(AccessConfig::default(), None).await
}

/// A file-backed database whose pool hands out up to `max_connections`
/// connections, so spawned tasks really run side by side.
pub async fn setup_shared(max_connections: u32) -> TestEnv {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = AccessConfig {
        database_url: format!("sqlite://{}?mode=rwc", dir.path().join("access.db").display()),
        max_connections,
        ..AccessConfig::default()
    };
    connect(config, Some(dir)).await
}

async fn connect(config: AccessConfig, dir: Option<TempDir>) -> TestEnv {
    let config = AccessConfig {
        password_iterations: 1_000,
        ..config
    };
    let clock = Arc::new(ManualClock::new(START));
    let ctx = AccessContext::connect(config)
        .await
        .expect("test database should migrate")
        .with_clock(clock.clone());
    TestEnv { ctx, clock, _dir: dir }
}

pub async fn user(env: &TestEnv, email: &str) -> user::Model {
    let name = email.split('@').next().unwrap_or("user");
    env.ctx
        .credentials()
        .create_user(email, PASSWORD, name)
        .await
        .expect("create user")
}

/// Organization owned by a fresh user `owner@<slug>.test`.
pub async fn org(env: &TestEnv, slug: &str) -> (organization::Model, user::Model) {
    let owner = user(env, &format!("owner@{slug}.test")).await;
    let org = env
        .ctx
        .tenancy()
        .create_organization(slug, slug, None, owner.id)
        .await
        .expect("create organization");
    (org, owner)
}

/// Insert a membership directly, bypassing invitations.
pub async fn add_member(env: &TestEnv, org_id: i32, user_id: i32, role: MemberRole) -> member::Model {
    member::ActiveModel {
        organization_id: Set(org_id),
        user_id: Set(user_id),
        role: Set(role),
        invited_by: Set(None),
        created_at: Set(START),
        updated_at: Set(START),
        ..Default::default()
    }
    .insert(env.ctx.db())
    .await
    .expect("insert member")
}

pub async fn project(env: &TestEnv, org_id: i32, name: &str) -> project::Model {
    project::ActiveModel {
        organization_id: Set(org_id),
        display_name: Set(name.to_string()),
        created_at: Set(START),
        updated_at: Set(START),
        ..Default::default()
    }
    .insert(env.ctx.db())
    .await
    .expect("insert project")
}

pub async fn dashboard(env: &TestEnv, project_id: i32, name: &str) -> dashboard::Model {
    dashboard::ActiveModel {
        project_id: Set(project_id),
        name: Set(name.to_string()),
        folder_id: Set(None),
        created_at: Set(START),
        updated_at: Set(START),
        ..Default::default()
    }
    .insert(env.ctx.db())
    .await
    .expect("insert dashboard")
}

pub async fn thread(env: &TestEnv, project_id: i32, name: &str) -> thread::Model {
    thread::ActiveModel {
        project_id: Set(project_id),
        name: Set(name.to_string()),
        folder_id: Set(None),
        created_at: Set(START),
        updated_at: Set(START),
        ..Default::default()
    }
    .insert(env.ctx.db())
    .await
    .expect("insert thread")
}

pub async fn spreadsheet(env: &TestEnv, project_id: i32, name: &str) -> spreadsheet::Model {
    spreadsheet::ActiveModel {
        project_id: Set(project_id),
        name: Set(name.to_string()),
        folder_id: Set(None),
        created_at: Set(START),
        updated_at: Set(START),
        ..Default::default()
    }
    .insert(env.ctx.db())
    .await
    .expect("insert spreadsheet")
}
