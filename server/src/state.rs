use std::sync::Arc;

use model::{
    Employee, Fuel, FuelDelivery, FuelDeliveryVolume, FuelTank, FuelTankReading,
    FuelTankReadingVolume, Id, Position, Role, User,
};
use tracing::info;

use crate::auth::{hash_password, new_salt, Sessions};
use crate::config::Config;
use crate::store::Collection;

pub struct AppState {
    pub config: Config,
    pub sessions: Sessions,
    pub roles: Collection<Role>,
    pub users: Collection<User>,
    pub positions: Collection<Position>,
    pub employees: Collection<Employee>,
    pub fuels: Collection<Fuel>,
    pub fuel_tanks: Collection<FuelTank>,
    pub readings: Collection<FuelTankReading>,
    pub reading_volumes: Collection<FuelTankReadingVolume>,
    pub deliveries: Collection<FuelDelivery>,
    pub delivery_volumes: Collection<FuelDeliveryVolume>,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let state = Arc::new(Self::with_config(Config::load()));
        state.seed_admin().await;
        state
    }

    fn with_config(config: Config) -> Self {
        Self {
            config,
            sessions: Sessions::new(),
            roles: Collection::new(),
            users: Collection::new(),
            positions: Collection::new(),
            employees: Collection::new(),
            fuels: Collection::new(),
            fuel_tanks: Collection::new(),
            readings: Collection::new(),
            reading_volumes: Collection::new(),
            deliveries: Collection::new(),
            delivery_volumes: Collection::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Arc<Self> {
        Arc::new(Self::with_config(Config::for_tests()))
    }

    /// Seeds an `admin` role and account from the configured credentials
    /// when the user collection is empty.
    async fn seed_admin(&self) {
        if self.users.count(|_| true).await > 0 {
            return;
        }

        let admin_role = match self.roles.find_one(|r| r.name == "admin").await {
            Some(role) => role,
            None => self
                .roles
                .insert(Role {
                    id: Id::new(),
                    name: "admin".to_string(),
                })
                .await
                .expect("seeding the admin role"),
        };

        let salt = new_salt();
        let password_hash = hash_password(&self.config.admin_password, &salt);
        self.users
            .insert(User {
                id: Id::new(),
                first_name: "Station".to_string(),
                last_name: "Administrator".to_string(),
                username: self.config.admin_username.clone(),
                password_hash,
                salt,
                role: admin_role.id,
            })
            .await
            .expect("seeding the admin account");

        info!("Seeded administrator account {}", self.config.admin_username);
    }
}
