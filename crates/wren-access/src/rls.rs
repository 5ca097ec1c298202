//! Session properties and row-level security policies.
//!
//! This module stores definitions and per-user values and turns them into a
//! property context for a query engine. It never looks inside policy
//! conditions or default expressions.

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::{debug, info};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;

use entity::session_property::{self, PropertyType};
use entity::{project, rls_policy, rls_policy_model, rls_policy_session_property, user_session_property_value};

use crate::context::AccessContext;
use crate::error::{conflict_on_unique, Error, Result};

/// A parsed session property value.
///
/// Numbers hold the trimmed input text, so large ids and exponent forms are
/// stored digit for digit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SessionValue {
    #[serde(rename = "string")]
    Text(String),
    Number(String),
    Boolean(bool),
}

impl SessionValue {
    /// Parse `raw` as `ty`. Numbers must be finite and are kept trimmed but
    /// otherwise verbatim; booleans are `true` or `false` in any case.
    pub fn parse(ty: PropertyType, raw: &str) -> Result<Self> {
        match ty {
            PropertyType::Text => Ok(SessionValue::Text(raw.to_string())),
            PropertyType::Number => {
                let trimmed = raw.trim();
                if trimmed.parse::<f64>().is_ok_and(f64::is_finite) {
                    Ok(SessionValue::Number(trimmed.to_string()))
                } else {
                    Err(Error::Validation(format!("{raw:?} is not a number")))
                }
            }
            PropertyType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(SessionValue::Boolean(true)),
                "false" => Ok(SessionValue::Boolean(false)),
                _ => Err(Error::Validation(format!("{raw:?} is not a boolean"))),
            },
        }
    }

    /// Canonical stored form.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SessionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionValue::Text(s) => f.write_str(s),
            SessionValue::Number(n) => f.write_str(n),
            SessionValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// One entry of a resolved context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ContextValue {
    /// The user's assigned value.
    Literal(SessionValue),
    /// Default expression for the query engine to evaluate.
    Deferred(String),
}

/// Property name to value, ordered by property definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PropertyContext {
    entries: Vec<(String, ContextValue)>,
}

impl PropertyContext {
    pub fn get(&self, name: &str) -> Option<&ContextValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build a context from definitions (in order) and assigned raw values.
///
/// Stored values that no longer parse under their property's type count as
/// missing.
pub fn resolve(properties: &[session_property::Model], assigned: &HashMap<i32, String>) -> Result<PropertyContext> {
    let mut entries = Vec::with_capacity(properties.len());
    let mut missing = Vec::new();

    for prop in properties {
        let value = assigned
            .get(&prop.id)
            .and_then(|raw| SessionValue::parse(prop.r#type, raw).ok());
        match (value, prop.default_expr.as_deref()) {
            (Some(v), _) => entries.push((prop.name.clone(), ContextValue::Literal(v))),
            (None, _) if prop.required => missing.push(prop.name.clone()),
            (None, Some(expr)) => entries.push((prop.name.clone(), ContextValue::Deferred(expr.to_string()))),
            (None, None) => {}
        }
    }

    if !missing.is_empty() {
        return Err(Error::MissingRequiredContext { missing });
    }
    Ok(PropertyContext { entries })
}

#[derive(Debug, Clone)]
pub struct NewProperty {
    pub name: String,
    pub r#type: PropertyType,
    pub required: bool,
    pub default_expr: Option<String>,
}

/// Partial property change. `default_expr: Some(None)` removes the default.
#[derive(Debug, Clone, Default)]
pub struct PropertyUpdate {
    pub name: Option<String>,
    pub r#type: Option<PropertyType>,
    pub required: Option<bool>,
    pub default_expr: Option<Option<String>>,
}

/// A user's value for one property.
#[derive(Debug, Clone, Serialize)]
pub struct AssignedValue {
    pub property: session_property::Model,
    pub value: SessionValue,
}

#[derive(Debug, Clone)]
pub struct NewPolicy {
    pub name: String,
    pub condition: String,
    pub model_ids: Vec<i32>,
    pub session_property_ids: Vec<i32>,
}

/// Partial policy change. Link lists, when given, replace the current links.
#[derive(Debug, Clone, Default)]
pub struct PolicyUpdate {
    pub name: Option<String>,
    pub condition: Option<String>,
    pub model_ids: Option<Vec<i32>>,
    pub session_property_ids: Option<Vec<i32>>,
}

/// Policy with its model and property links.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyDetail {
    #[serde(flatten)]
    pub policy: rls_policy::Model,
    pub model_ids: Vec<i32>,
    pub session_property_ids: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct RlsPolicyResolver {
    ctx: AccessContext,
}

impl RlsPolicyResolver {
    pub(crate) fn new(ctx: AccessContext) -> Self {
        Self { ctx }
    }

    pub async fn define_property(&self, project_id: i32, def: NewProperty) -> Result<session_property::Model> {
        let name = property_name(&def.name)?;
        self.require_project(project_id).await?;

        let now = self.ctx.now();
        let created = session_property::ActiveModel {
            project_id: Set(project_id),
            name: Set(name.clone()),
            r#type: Set(def.r#type),
            required: Set(def.required),
            default_expr: Set(non_blank(def.default_expr)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.ctx.db)
        .await
        .map_err(|e| conflict_on_unique(e, format!("session property {name} already exists")))?;

        info!("defined session property {} in project {}", created.id, project_id);
        Ok(created)
    }

    pub async fn list_properties(&self, project_id: i32) -> Result<Vec<session_property::Model>> {
        Ok(session_property::Entity::find()
            .filter(session_property::Column::ProjectId.eq(project_id))
            .order_by_asc(session_property::Column::Id)
            .all(&self.ctx.db)
            .await?)
    }

    pub async fn get_property(&self, property_id: i32) -> Result<session_property::Model> {
        session_property::Entity::find_by_id(property_id)
            .one(&self.ctx.db)
            .await?
            .ok_or_else(|| Error::not_found("session property"))
    }

    /// Change a definition. A type change is refused while any assigned
    /// value would not parse under the new type.
    pub async fn update_property(&self, property_id: i32, update: PropertyUpdate) -> Result<session_property::Model> {
        let found = self.get_property(property_id).await?;

        if let Some(ty) = update.r#type.filter(|ty| *ty != found.r#type) {
            let values = user_session_property_value::Entity::find()
                .filter(user_session_property_value::Column::SessionPropertyId.eq(property_id))
                .all(&self.ctx.db)
                .await?;
            if let Some(bad) = values.iter().find(|v| SessionValue::parse(ty, &v.value).is_err()) {
                return Err(Error::Validation(format!(
                    "user {} holds a value that is not valid for the new type",
                    bad.user_id
                )));
            }
        }

        let mut active: session_property::ActiveModel = found.into();
        if let Some(name) = update.name {
            active.name = Set(property_name(&name)?);
        }
        if let Some(ty) = update.r#type {
            active.r#type = Set(ty);
        }
        if let Some(required) = update.required {
            active.required = Set(required);
        }
        if let Some(expr) = update.default_expr {
            active.default_expr = Set(non_blank(expr));
        }
        active.updated_at = Set(self.ctx.now());

        active
            .update(&self.ctx.db)
            .await
            .map_err(|e| conflict_on_unique(e, "session property name already exists"))
    }

    /// Delete a definition with its assigned values and policy links.
    pub async fn delete_property(&self, property_id: i32) -> Result<()> {
        let txn = self.ctx.db.begin().await?;
        user_session_property_value::Entity::delete_many()
            .filter(user_session_property_value::Column::SessionPropertyId.eq(property_id))
            .exec(&txn)
            .await?;
        rls_policy_session_property::Entity::delete_many()
            .filter(rls_policy_session_property::Column::SessionPropertyId.eq(property_id))
            .exec(&txn)
            .await?;
        let res = session_property::Entity::delete_by_id(property_id).exec(&txn).await?;
        if res.rows_affected == 0 {
            return Err(Error::not_found("session property"));
        }
        txn.commit().await?;

        info!("deleted session property {property_id}");
        Ok(())
    }

    /// Set a user's value, replacing any previous one.
    pub async fn assign_value(&self, user_id: i32, property_id: i32, raw: &str) -> Result<user_session_property_value::Model> {
        let prop = self.get_property(property_id).await?;
        let value = SessionValue::parse(prop.r#type, raw)?;
        upsert_value(&self.ctx.db, user_id, property_id, &value, self.ctx.now()).await
    }

    /// Set several values at once. Either all are stored or none.
    pub async fn assign_values(&self, user_id: i32, values: &[(i32, String)]) -> Result<Vec<user_session_property_value::Model>> {
        let ids: Vec<i32> = values.iter().map(|(id, _)| *id).collect();
        let props: HashMap<i32, session_property::Model> = session_property::Entity::find()
            .filter(session_property::Column::Id.is_in(ids))
            .all(&self.ctx.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut parsed = Vec::with_capacity(values.len());
        for (property_id, raw) in values {
            let prop = props
                .get(property_id)
                .ok_or_else(|| Error::not_found("session property"))?;
            let value = SessionValue::parse(prop.r#type, raw)
                .map_err(|e| Error::Validation(format!("{}: {e}", prop.name)))?;
            parsed.push((*property_id, value));
        }

        let now = self.ctx.now();
        let txn = self.ctx.db.begin().await?;
        let mut out = Vec::with_capacity(parsed.len());
        for (property_id, value) in &parsed {
            out.push(upsert_value(&txn, user_id, *property_id, value, now).await?);
        }
        txn.commit().await?;

        debug!("assigned {} session values for user {}", out.len(), user_id);
        Ok(out)
    }

    /// Remove a user's value. Returns whether one existed.
    pub async fn clear_value(&self, user_id: i32, property_id: i32) -> Result<bool> {
        let res = user_session_property_value::Entity::delete_many()
            .filter(user_session_property_value::Column::UserId.eq(user_id))
            .filter(user_session_property_value::Column::SessionPropertyId.eq(property_id))
            .exec(&self.ctx.db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// The user's values for a project's properties, in definition order.
    pub async fn list_user_values(&self, project_id: i32, user_id: i32) -> Result<Vec<AssignedValue>> {
        let props = self.list_properties(project_id).await?;
        let assigned = self.assigned_values(&props, user_id).await?;

        Ok(props
            .into_iter()
            .filter_map(|p| {
                let value = assigned
                    .get(&p.id)
                    .and_then(|raw| SessionValue::parse(p.r#type, raw).ok())?;
                Some(AssignedValue { property: p, value })
            })
            .collect())
    }

    /// Resolve the property context `user_id` runs queries with in a project.
    ///
    /// Fails with [`Error::MissingRequiredContext`] naming every required
    /// property the user has no value for.
    pub async fn resolve_context(&self, project_id: i32, user_id: i32) -> Result<PropertyContext> {
        let props = self.list_properties(project_id).await?;
        let assigned = self.assigned_values(&props, user_id).await?;
        resolve(&props, &assigned)
    }

    pub async fn create_policy(&self, project_id: i32, def: NewPolicy) -> Result<PolicyDetail> {
        let name = required_text(&def.name, "policy name")?;
        let condition = required_text(&def.condition, "policy condition")?;
        self.require_project(project_id).await?;
        let model_ids = dedup(def.model_ids);
        let property_ids = dedup(def.session_property_ids);
        self.check_properties_in_project(project_id, &property_ids).await?;

        let now = self.ctx.now();
        let txn = self.ctx.db.begin().await?;
        let policy = rls_policy::ActiveModel {
            project_id: Set(project_id),
            name: Set(name),
            condition: Set(condition),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        link_models(&txn, policy.id, &model_ids).await?;
        link_properties(&txn, policy.id, &property_ids).await?;
        txn.commit().await?;

        info!("created rls policy {} in project {}", policy.id, project_id);
        Ok(PolicyDetail {
            policy,
            model_ids,
            session_property_ids: property_ids,
        })
    }

    pub async fn update_policy(&self, policy_id: i32, update: PolicyUpdate) -> Result<PolicyDetail> {
        let found = rls_policy::Entity::find_by_id(policy_id)
            .one(&self.ctx.db)
            .await?
            .ok_or_else(|| Error::not_found("rls policy"))?;
        let project_id = found.project_id;

        let property_ids = update.session_property_ids.map(dedup);
        if let Some(ids) = &property_ids {
            self.check_properties_in_project(project_id, ids).await?;
        }

        let mut active: rls_policy::ActiveModel = found.into();
        if let Some(name) = update.name {
            active.name = Set(required_text(&name, "policy name")?);
        }
        if let Some(condition) = update.condition {
            active.condition = Set(required_text(&condition, "policy condition")?);
        }
        active.updated_at = Set(self.ctx.now());

        let txn = self.ctx.db.begin().await?;
        active.update(&txn).await?;
        if let Some(ids) = update.model_ids.map(dedup) {
            rls_policy_model::Entity::delete_many()
                .filter(rls_policy_model::Column::RlsPolicyId.eq(policy_id))
                .exec(&txn)
                .await?;
            link_models(&txn, policy_id, &ids).await?;
        }
        if let Some(ids) = &property_ids {
            rls_policy_session_property::Entity::delete_many()
                .filter(rls_policy_session_property::Column::RlsPolicyId.eq(policy_id))
                .exec(&txn)
                .await?;
            link_properties(&txn, policy_id, ids).await?;
        }
        txn.commit().await?;

        self.get_policy(policy_id).await
    }

    pub async fn delete_policy(&self, policy_id: i32) -> Result<()> {
        let txn = self.ctx.db.begin().await?;
        rls_policy_model::Entity::delete_many()
            .filter(rls_policy_model::Column::RlsPolicyId.eq(policy_id))
            .exec(&txn)
            .await?;
        rls_policy_session_property::Entity::delete_many()
            .filter(rls_policy_session_property::Column::RlsPolicyId.eq(policy_id))
            .exec(&txn)
            .await?;
        let res = rls_policy::Entity::delete_by_id(policy_id).exec(&txn).await?;
        if res.rows_affected == 0 {
            return Err(Error::not_found("rls policy"));
        }
        txn.commit().await?;

        info!("deleted rls policy {policy_id}");
        Ok(())
    }

    pub async fn get_policy(&self, policy_id: i32) -> Result<PolicyDetail> {
        let policy = rls_policy::Entity::find_by_id(policy_id)
            .one(&self.ctx.db)
            .await?
            .ok_or_else(|| Error::not_found("rls policy"))?;
        let mut details = self.with_links(vec![policy]).await?;
        details.pop().ok_or_else(|| Error::not_found("rls policy"))
    }

    pub async fn list_policies(&self, project_id: i32) -> Result<Vec<PolicyDetail>> {
        let policies = rls_policy::Entity::find()
            .filter(rls_policy::Column::ProjectId.eq(project_id))
            .order_by_asc(rls_policy::Column::Id)
            .all(&self.ctx.db)
            .await?;
        self.with_links(policies).await
    }

    /// Policies of a project that apply to `model_id`.
    pub async fn policies_for_model(&self, project_id: i32, model_id: i32) -> Result<Vec<PolicyDetail>> {
        let policy_ids: Vec<i32> = rls_policy_model::Entity::find()
            .filter(rls_policy_model::Column::ModelId.eq(model_id))
            .all(&self.ctx.db)
            .await?
            .into_iter()
            .map(|l| l.rls_policy_id)
            .collect();
        if policy_ids.is_empty() {
            return Ok(Vec::new());
        }

        let policies = rls_policy::Entity::find()
            .filter(rls_policy::Column::ProjectId.eq(project_id))
            .filter(rls_policy::Column::Id.is_in(policy_ids))
            .order_by_asc(rls_policy::Column::Id)
            .all(&self.ctx.db)
            .await?;
        self.with_links(policies).await
    }

    async fn with_links(&self, policies: Vec<rls_policy::Model>) -> Result<Vec<PolicyDetail>> {
        if policies.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = policies.iter().map(|p| p.id).collect();

        let mut models: HashMap<i32, Vec<i32>> = HashMap::new();
        for link in rls_policy_model::Entity::find()
            .filter(rls_policy_model::Column::RlsPolicyId.is_in(ids.clone()))
            .order_by_asc(rls_policy_model::Column::Id)
            .all(&self.ctx.db)
            .await?
        {
            models.entry(link.rls_policy_id).or_default().push(link.model_id);
        }

        let mut props: HashMap<i32, Vec<i32>> = HashMap::new();
        for link in rls_policy_session_property::Entity::find()
            .filter(rls_policy_session_property::Column::RlsPolicyId.is_in(ids))
            .order_by_asc(rls_policy_session_property::Column::Id)
            .all(&self.ctx.db)
            .await?
        {
            props
                .entry(link.rls_policy_id)
                .or_default()
                .push(link.session_property_id);
        }

        Ok(policies
            .into_iter()
            .map(|policy| PolicyDetail {
                model_ids: models.remove(&policy.id).unwrap_or_default(),
                session_property_ids: props.remove(&policy.id).unwrap_or_default(),
                policy,
            })
            .collect())
    }

    async fn assigned_values(&self, props: &[session_property::Model], user_id: i32) -> Result<HashMap<i32, String>> {
        if props.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(user_session_property_value::Entity::find()
            .filter(user_session_property_value::Column::UserId.eq(user_id))
            .filter(user_session_property_value::Column::SessionPropertyId.is_in(props.iter().map(|p| p.id)))
            .all(&self.ctx.db)
            .await?
            .into_iter()
            .map(|v| (v.session_property_id, v.value))
            .collect())
    }

    async fn check_properties_in_project(&self, project_id: i32, ids: &[i32]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let found: HashSet<i32> = session_property::Entity::find()
            .filter(session_property::Column::ProjectId.eq(project_id))
            .filter(session_property::Column::Id.is_in(ids.iter().copied()))
            .all(&self.ctx.db)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        match ids.iter().find(|id| !found.contains(id)) {
            Some(id) => Err(Error::Validation(format!(
                "session property {id} does not belong to project {project_id}"
            ))),
            None => Ok(()),
        }
    }

    async fn require_project(&self, project_id: i32) -> Result<()> {
        if project::Entity::find_by_id(project_id).one(&self.ctx.db).await?.is_none() {
            return Err(Error::not_found("project"));
        }
        Ok(())
    }
}

async fn upsert_value<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    property_id: i32,
    value: &SessionValue,
    now: i64,
) -> Result<user_session_property_value::Model> {
    let row = user_session_property_value::ActiveModel {
        user_id: Set(user_id),
        session_property_id: Set(property_id),
        value: Set(value.canonical()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    user_session_property_value::Entity::insert(row)
        .on_conflict(
            OnConflict::columns([
                user_session_property_value::Column::UserId,
                user_session_property_value::Column::SessionPropertyId,
            ])
            .update_columns([
                user_session_property_value::Column::Value,
                user_session_property_value::Column::UpdatedAt,
            ])
            .to_owned(),
        )
        .exec(conn)
        .await?;

    user_session_property_value::Entity::find()
        .filter(user_session_property_value::Column::UserId.eq(user_id))
        .filter(user_session_property_value::Column::SessionPropertyId.eq(property_id))
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("session property value"))
}

async fn link_models<C: ConnectionTrait>(conn: &C, policy_id: i32, model_ids: &[i32]) -> Result<()> {
    for model_id in model_ids {
        rls_policy_model::ActiveModel {
            rls_policy_id: Set(policy_id),
            model_id: Set(*model_id),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }
    Ok(())
}

async fn link_properties<C: ConnectionTrait>(conn: &C, policy_id: i32, property_ids: &[i32]) -> Result<()> {
    for property_id in property_ids {
        rls_policy_session_property::ActiveModel {
            rls_policy_id: Set(policy_id),
            session_property_id: Set(*property_id),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }
    Ok(())
}

/// Property names end up as identifiers in generated SQL.
fn property_name(name: &str) -> Result<String> {
    let name = name.trim();
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(Error::Validation(format!(
            "{name:?} is not a valid property name"
        )));
    }
    Ok(name.to_string())
}

fn required_text(value: &str, what: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Validation(format!("{what} cannot be blank")));
    }
    Ok(value.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn dedup(mut ids: Vec<i32>) -> Vec<i32> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.retain(|id| seen.insert(*id));
    ids
}
