//! Per-entity resource descriptors.
//!
//! Every dashboard screen runs the same list/filter/mutate cycle; what differs
//! per entity is captured here as data: endpoint paths, the id and category
//! fields, searchable fields, required form fields and which form fields hold
//! media files.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Where a file-valued form field gets uploaded before the record is written.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadTarget {
    ImageHost,
    Cdn,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMethod {
    #[default]
    Put,
    Post,
}

/// How a delete request carries the record id.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    #[default]
    Path,
    Body,
}

/// Descriptor for one backend entity type. Paths are relative to the API base
/// URL; `{id}` is replaced with the record id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceSpec {
    pub name: String,
    pub list_path: String,
    /// Key holding the array in list responses, when not `items`/bare array.
    #[serde(default)]
    pub list_key: Option<String>,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default)]
    pub category_field: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Fields matched by the search box. Empty means every top-level string.
    #[serde(default)]
    pub search_fields: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub file_fields: BTreeMap<String, UploadTarget>,
    #[serde(default)]
    pub create_path: Option<String>,
    #[serde(default)]
    pub update_path: Option<String>,
    #[serde(default)]
    pub update_method: UpdateMethod,
    #[serde(default)]
    pub delete_path: Option<String>,
    #[serde(default)]
    pub delete_mode: DeleteMode,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub action_path: Option<String>,
    #[serde(default = "default_action_field")]
    pub action_field: String,
    /// Dedicated remote search-by-id endpoint.
    #[serde(default)]
    pub search_path: Option<String>,
}

fn default_id_field() -> String {
    "_id".into()
}

fn default_action_field() -> String {
    "action".into()
}

fn fill(template: &str, id: &str) -> String {
    template.replace("{id}", id)
}

impl ResourceSpec {
    /// Minimal descriptor: list/create at `list_path`, update/delete at `list_path/{id}`.
    pub fn new(name: &str, list_path: &str) -> Self {
        Self {
            name: name.into(),
            list_path: list_path.into(),
            list_key: None,
            id_field: default_id_field(),
            category_field: None,
            categories: Vec::new(),
            search_fields: Vec::new(),
            required: Vec::new(),
            file_fields: BTreeMap::new(),
            create_path: None,
            update_path: None,
            update_method: UpdateMethod::default(),
            delete_path: None,
            delete_mode: DeleteMode::default(),
            actions: Vec::new(),
            action_path: None,
            action_field: default_action_field(),
            search_path: None,
        }
    }

    pub fn create_url_path(&self) -> String {
        self.create_path
            .clone()
            .unwrap_or_else(|| self.list_path.clone())
    }

    pub fn update_url_path(&self, id: &str) -> String {
        match &self.update_path {
            Some(t) => fill(t, id),
            None => format!("{}/{}", self.list_path.trim_end_matches('/'), id),
        }
    }

    pub fn delete_url_path(&self, id: &str) -> String {
        match (&self.delete_path, self.delete_mode) {
            (Some(t), _) => fill(t, id),
            (None, DeleteMode::Path) => format!("{}/{}", self.list_path.trim_end_matches('/'), id),
            (None, DeleteMode::Body) => self.list_path.clone(),
        }
    }

    pub fn action_url_path(&self, id: &str) -> String {
        match &self.action_path {
            Some(t) => fill(t, id),
            None => format!("{}/{}/status", self.list_path.trim_end_matches('/'), id),
        }
    }

    pub fn search_url_path(&self, id: &str) -> Option<String> {
        self.search_path.as_deref().map(|t| fill(t, id))
    }

    pub fn supports_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }

    /// Identifier of a record as a string. Numbers are stringified; `_id` and
    /// `id` are tried when the configured field is missing.
    pub fn record_id(&self, record: &Value) -> Option<String> {
        [self.id_field.as_str(), "_id", "id"]
            .iter()
            .find_map(|f| record.get(*f).and_then(scalar_to_string))
    }

    pub fn record_category(&self, record: &Value) -> Option<String> {
        let field = self.category_field.as_deref()?;
        record.get(field).and_then(scalar_to_string)
    }
}

/// Render a JSON scalar as plain text; `None` for null, arrays and objects.
pub fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The set of resources the dashboard manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    specs: BTreeMap<String, ResourceSpec>,
}

impl Catalog {
    pub fn builtin() -> Self {
        let mut specs = BTreeMap::new();
        for spec in builtin_specs() {
            specs.insert(spec.name.clone(), spec);
        }
        Self { specs }
    }

    /// Built-ins with config entries replacing same-named descriptors.
    pub fn with_overrides(overrides: &BTreeMap<String, ResourceSpec>) -> Self {
        let mut catalog = Self::builtin();
        for (name, spec) in overrides {
            let mut spec = spec.clone();
            spec.name = name.clone();
            catalog.specs.insert(name.clone(), spec);
        }
        catalog
    }

    pub fn get(&self, name: &str) -> Option<&ResourceSpec> {
        self.specs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn builtin_specs() -> Vec<ResourceSpec> {
    let mut users = ResourceSpec::new("users", "admin/users");
    users.list_key = Some("users".into());
    users.category_field = Some("status".into());
    users.categories = strings(&["active", "banned"]);
    users.search_fields = strings(&["username", "email", "ui_id"]);
    users.actions = strings(&["ban", "unban"]);
    users.search_path = Some("admin/users/search/{id}".into());

    let mut rooms = ResourceSpec::new("rooms", "admin/rooms");
    rooms.list_key = Some("rooms".into());
    rooms.category_field = Some("status".into());
    rooms.categories = strings(&["active", "closed", "banned"]);
    rooms.search_fields = strings(&["name", "room_id", "owner"]);
    rooms.actions = strings(&["close", "ban", "unban"]);
    rooms.search_path = Some("admin/rooms/search/{id}".into());

    let mut shop_items = ResourceSpec::new("shop-items", "shop/items");
    shop_items.category_field = Some("category".into());
    shop_items.categories = strings(&["frame", "entrance", "bubble", "theme"]);
    shop_items.search_fields = strings(&["name"]);
    shop_items.required = strings(&["name", "price", "category"]);
    shop_items.file_fields.insert("image".into(), UploadTarget::ImageHost);

    let mut vip_items = ResourceSpec::new("vip-items", "vip/items");
    vip_items.search_fields = strings(&["name"]);
    vip_items.required = strings(&["name", "level", "price"]);
    vip_items.file_fields.insert("image".into(), UploadTarget::ImageHost);
    vip_items.file_fields.insert("animation".into(), UploadTarget::Cdn);

    let mut banners = ResourceSpec::new("banners", "banners");
    banners.search_fields = strings(&["title"]);
    banners.required = strings(&["title"]);
    banners.file_fields.insert("image".into(), UploadTarget::ImageHost);
    banners.delete_mode = DeleteMode::Body;

    let mut posts = ResourceSpec::new("posts", "admin/posts");
    posts.list_key = Some("posts".into());
    posts.search_fields = strings(&["content", "author"]);

    let mut gifts = ResourceSpec::new("gifts", "gifts");
    gifts.category_field = Some("category".into());
    gifts.categories = strings(&["normal", "lucky", "vip"]);
    gifts.search_fields = strings(&["name"]);
    gifts.required = strings(&["name", "price"]);
    gifts.file_fields.insert("icon".into(), UploadTarget::ImageHost);
    gifts.file_fields.insert("animation".into(), UploadTarget::Cdn);

    let mut feedback = ResourceSpec::new("feedback", "admin/feedback");
    feedback.category_field = Some("status".into());
    feedback.categories = strings(&["open", "resolved"]);
    feedback.search_fields = strings(&["message", "user_id"]);
    feedback.actions = strings(&["resolve"]);
    feedback.action_path = Some("admin/feedback/{id}/resolve".into());

    let mut withdrawals = ResourceSpec::new("withdrawals", "admin/withdrawals");
    withdrawals.category_field = Some("status".into());
    withdrawals.categories = strings(&["pending", "approved", "rejected"]);
    withdrawals.search_fields = strings(&["user_id", "account"]);
    withdrawals.actions = strings(&["approve", "reject"]);
    withdrawals.action_field = "type".into();

    let mut merchants = ResourceSpec::new("merchants", "admin/merchants");
    merchants.search_fields = strings(&["name", "user_id"]);
    merchants.required = strings(&["name", "user_id"]);

    let mut coin_prices = ResourceSpec::new("coin-prices", "coin-price");
    coin_prices.required = strings(&["coins", "price"]);
    coin_prices.update_method = UpdateMethod::Post;

    let mut backgrounds = ResourceSpec::new("background-requests", "admin/room-backgrounds");
    backgrounds.category_field = Some("status".into());
    backgrounds.categories = strings(&["pending", "approved", "rejected"]);
    backgrounds.search_fields = strings(&["room_id"]);
    backgrounds.actions = strings(&["approve", "reject"]);
    backgrounds.action_path = Some("admin/room-backgrounds/{id}/review".into());

    vec![
        users,
        rooms,
        shop_items,
        vip_items,
        banners,
        posts,
        gifts,
        feedback,
        withdrawals,
        merchants,
        coin_prices,
        backgrounds,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_covers_every_screen() {
        let catalog = Catalog::builtin();
        let names: Vec<&str> = catalog.names().collect();
        for expected in [
            "users",
            "rooms",
            "shop-items",
            "vip-items",
            "banners",
            "posts",
            "gifts",
            "feedback",
            "withdrawals",
            "merchants",
            "coin-prices",
            "background-requests",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn paths_fill_ids() {
        let catalog = Catalog::builtin();
        let users = catalog.get("users").unwrap();
        assert_eq!(users.update_url_path("7"), "admin/users/7");
        assert_eq!(users.delete_url_path("7"), "admin/users/7");
        assert_eq!(users.action_url_path("7"), "admin/users/7/status");
        assert_eq!(users.search_url_path("7").as_deref(), Some("admin/users/search/7"));

        let feedback = catalog.get("feedback").unwrap();
        assert_eq!(feedback.action_url_path("f1"), "admin/feedback/f1/resolve");

        let banners = catalog.get("banners").unwrap();
        assert_eq!(banners.delete_url_path("b1"), "banners");
        assert!(banners.search_url_path("b1").is_none());
    }

    #[test]
    fn record_id_handles_numbers_and_fallbacks() {
        let spec = ResourceSpec::new("x", "x");
        assert_eq!(spec.record_id(&json!({"_id": "abc"})).as_deref(), Some("abc"));
        assert_eq!(spec.record_id(&json!({"id": 42})).as_deref(), Some("42"));
        assert_eq!(spec.record_id(&json!({"name": "n"})), None);
    }

    #[test]
    fn overrides_replace_builtins_by_name() {
        let mut overrides = BTreeMap::new();
        let mut spec = ResourceSpec::new("ignored", "v2/gifts");
        spec.id_field = "gift_id".into();
        overrides.insert("gifts".to_string(), spec);
        let catalog = Catalog::with_overrides(&overrides);
        let gifts = catalog.get("gifts").unwrap();
        assert_eq!(gifts.name, "gifts");
        assert_eq!(gifts.list_path, "v2/gifts");
        assert_eq!(gifts.id_field, "gift_id");
    }
}
