//! Typed clients for the restaurant-management REST API
//!
//! All calls go through [`AuthorizedClient`], so they carry the bearer token
//! and share its 401 recovery.

mod models;

use std::collections::HashMap;

use crate::error::Error;
use crate::fetch::AuthorizedClient;

pub use models::{
    MenuItem, MenuItemCreate, MenuItemFilter, MenuItemUpdate, Permission, PermissionCreate,
    PermissionUpdate, Restaurant, RestaurantCreate, RestaurantSummary, RestaurantUpdate, Role,
    RoleCreate, RoleSummary, RoleUpdate, Tenant, TenantInput, UserRole, UserRoleAssignment,
};

fn encode(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

/// Tenants: the organisations that own restaurants
pub struct TenantsApi<'a> {
    client: &'a AuthorizedClient,
}

impl<'a> TenantsApi<'a> {
    /// Create a new tenants client
    pub fn new(client: &'a AuthorizedClient) -> Self {
        Self { client }
    }

    /// List every tenant visible to the signed-in user
    pub async fn list(&self) -> Result<Vec<Tenant>, Error> {
        self.client.get("tenants/")?.execute().await
    }

    /// Fetch one tenant by id
    pub async fn get(&self, id: &str) -> Result<Tenant, Error> {
        self.client
            .get(&format!("tenants/{}", encode(id)))?
            .execute()
            .await
    }

    /// Create a tenant and return it as stored
    pub async fn create(&self, tenant: &TenantInput) -> Result<Tenant, Error> {
        self.client.post("tenants/")?.json(tenant)?.execute().await
    }

    /// Full replacement.
    pub async fn update(&self, id: &str, tenant: &TenantInput) -> Result<Tenant, Error> {
        self.client
            .put(&format!("tenants/{}", encode(id)))?
            .json(tenant)?
            .execute()
            .await
    }

    /// Returns the deleted tenant.
    pub async fn delete(&self, id: &str) -> Result<Tenant, Error> {
        self.client
            .delete(&format!("tenants/{}", encode(id)))?
            .execute()
            .await
    }
}

/// Restaurants, optionally scoped to a tenant
pub struct RestaurantsApi<'a> {
    client: &'a AuthorizedClient,
}

impl<'a> RestaurantsApi<'a> {
    /// Create a new restaurants client
    pub fn new(client: &'a AuthorizedClient) -> Self {
        Self { client }
    }

    /// List restaurants
    ///
    /// With `tenant_id` set, only that tenant's restaurants are returned.
    pub async fn list(&self, tenant_id: Option<&str>) -> Result<Vec<Restaurant>, Error> {
        let mut params = HashMap::new();
        if let Some(tenant_id) = tenant_id {
            params.insert("tenant_id".to_string(), tenant_id.to_string());
        }
        self.client
            .get("restaurants/")?
            .query(params)
            .execute()
            .await
    }

    /// Fetch one restaurant by id
    pub async fn get(&self, id: &str) -> Result<Restaurant, Error> {
        self.client
            .get(&format!("restaurants/{}", encode(id)))?
            .execute()
            .await
    }

    /// Create a restaurant under the tenant named in `restaurant`
    pub async fn create(&self, restaurant: &RestaurantCreate) -> Result<Restaurant, Error> {
        self.client
            .post("restaurants/")?
            .json(restaurant)?
            .execute()
            .await
    }

    /// Apply a partial update. Fields left as `None` are not sent.
    pub async fn update(&self, id: &str, changes: &RestaurantUpdate) -> Result<Restaurant, Error> {
        self.client
            .put(&format!("restaurants/{}", encode(id)))?
            .json(changes)?
            .execute()
            .await
    }

    /// Delete a restaurant, returning the deleted record
    pub async fn delete(&self, id: &str) -> Result<Restaurant, Error> {
        self.client
            .delete(&format!("restaurants/{}", encode(id)))?
            .execute()
            .await
    }
}

/// Menu items of a restaurant
pub struct MenuItemsApi<'a> {
    client: &'a AuthorizedClient,
}

impl<'a> MenuItemsApi<'a> {
    /// Create a new menu items client
    pub fn new(client: &'a AuthorizedClient) -> Self {
        Self { client }
    }

    /// List menu items matching `filter`; an empty filter lists everything
    pub async fn list(&self, filter: &MenuItemFilter) -> Result<Vec<MenuItem>, Error> {
        self.client
            .get("menu-items/")?
            .query(filter.to_params())
            .execute()
            .await
    }

    /// Fetch one menu item by id
    pub async fn get(&self, id: &str) -> Result<MenuItem, Error> {
        self.client
            .get(&format!("menu-items/{}", encode(id)))?
            .execute()
            .await
    }

    /// Create a menu item
    pub async fn create(&self, item: &MenuItemCreate) -> Result<MenuItem, Error> {
        self.client.post("menu-items/")?.json(item)?.execute().await
    }

    pub async fn update(&self, id: &str, changes: &MenuItemUpdate) -> Result<MenuItem, Error> {
        self.client
            .put(&format!("menu-items/{}", encode(id)))?
            .json(changes)?
            .execute()
            .await
    }

    /// Delete a menu item, returning the deleted record
    pub async fn delete(&self, id: &str) -> Result<MenuItem, Error> {
        self.client
            .delete(&format!("menu-items/{}", encode(id)))?
            .execute()
            .await
    }
}

/// Roles, their permissions, and role grants to users.
pub struct RolesApi<'a> {
    client: &'a AuthorizedClient,
}

impl<'a> RolesApi<'a> {
    /// Create a new roles client
    pub fn new(client: &'a AuthorizedClient) -> Self {
        Self { client }
    }

    /// List every role
    pub async fn list(&self) -> Result<Vec<Role>, Error> {
        self.client.get("roles/")?.execute().await
    }

    /// Fetch one role by id
    pub async fn get(&self, id: &str) -> Result<Role, Error> {
        self.client
            .get(&format!("roles/{}", encode(id)))?
            .execute()
            .await
    }

    /// Create a role
    pub async fn create(&self, role: &RoleCreate) -> Result<Role, Error> {
        self.client.post("roles/")?.json(role)?.execute().await
    }

    /// Apply a partial update to a role
    pub async fn update(&self, id: &str, changes: &RoleUpdate) -> Result<Role, Error> {
        self.client
            .patch(&format!("roles/{}", encode(id)))?
            .json(changes)?
            .execute()
            .await
    }

    /// Delete a role. The backend answers with no body.
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        self.client
            .delete(&format!("roles/{}", encode(id)))?
            .execute_empty()
            .await
    }

    /// The permissions granted to a role
    pub async fn permissions(&self, role_id: &str) -> Result<Vec<Permission>, Error> {
        self.client
            .get(&format!("roles/{}/permissions", encode(role_id)))?
            .execute()
            .await
    }

    /// Grant a permission to a role
    pub async fn assign_permission(&self, role_id: &str, permission_id: &str) -> Result<(), Error> {
        self.client
            .post(&format!(
                "roles/{}/permissions/{}",
                encode(role_id),
                encode(permission_id)
            ))?
            .json(&serde_json::json!({}))?
            .execute_empty()
            .await
    }

    /// Revoke a permission from a role
    pub async fn remove_permission(&self, role_id: &str, permission_id: &str) -> Result<(), Error> {
        self.client
            .delete(&format!(
                "roles/{}/permissions/{}",
                encode(role_id),
                encode(permission_id)
            ))?
            .execute_empty()
            .await
    }

    /// Every role grant held by a user
    pub async fn user_roles(&self, user_id: &str) -> Result<Vec<UserRole>, Error> {
        self.client
            .get(&format!("user-roles/user/{}", encode(user_id)))?
            .execute()
            .await
    }

    /// Grants of a role, optionally limited to one restaurant
    pub async fn users_with_role(
        &self,
        role_id: &str,
        restaurant_id: Option<&str>,
    ) -> Result<Vec<UserRole>, Error> {
        let mut params = HashMap::new();
        if let Some(restaurant_id) = restaurant_id {
            params.insert("restaurant_id".to_string(), restaurant_id.to_string());
        }
        self.client
            .get(&format!("user-roles/role/{}", encode(role_id)))?
            .query(params)
            .execute()
            .await
    }

    /// Grant a role to a user, optionally scoped to a restaurant
    pub async fn assign_to_user(&self, assignment: &UserRoleAssignment) -> Result<UserRole, Error> {
        self.client
            .post("user-roles/")?
            .json(assignment)?
            .execute()
            .await
    }

    /// Remove a user's role grant by the grant's id
    pub async fn remove_from_user(&self, user_role_id: &str) -> Result<(), Error> {
        self.client
            .delete(&format!("user-roles/{}", encode(user_role_id)))?
            .execute_empty()
            .await
    }
}

/// Permissions that can be granted to roles
pub struct PermissionsApi<'a> {
    client: &'a AuthorizedClient,
}

impl<'a> PermissionsApi<'a> {
    /// Create a new permissions client
    pub fn new(client: &'a AuthorizedClient) -> Self {
        Self { client }
    }

    /// List every permission
    pub async fn list(&self) -> Result<Vec<Permission>, Error> {
        self.client.get("permissions/")?.execute().await
    }

    /// Fetch one permission by id
    pub async fn get(&self, id: &str) -> Result<Permission, Error> {
        self.client
            .get(&format!("permissions/{}", encode(id)))?
            .execute()
            .await
    }

    pub async fn create(&self, permission: &PermissionCreate) -> Result<Permission, Error> {
        self.client
            .post("permissions/")?
            .json(permission)?
            .execute()
            .await
    }

    pub async fn update(&self, id: &str, changes: &PermissionUpdate) -> Result<Permission, Error> {
        self.client
            .patch(&format!("permissions/{}", encode(id)))?
            .json(changes)?
            .execute()
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        self.client
            .delete(&format!("permissions/{}", encode(id)))?
            .execute_empty()
            .await
    }
}
