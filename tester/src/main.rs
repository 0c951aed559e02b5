//! Drives the list contract against a running server: logs in, then pages,
//! sorts and filters the user list over HTTP.
//!
//! ```sh
//! RUST_PORT=4000 cargo run -p forecourt &
//! cargo run -p tester
//! ```

use std::collections::BTreeMap;
use std::env;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use table::{Fetch, FetchError, ListController, ListState, Outcome, Page, RowsState};

struct HttpFetch {
    client: Client,
    base: String,
    token: String,
}

#[async_trait]
impl Fetch<Value> for HttpFetch {
    async fn fetch(&self, state: &ListState) -> Result<Page<Value>, FetchError> {
        let mut query: Vec<(String, String)> = vec![
            ("page".to_string(), state.page.to_string()),
            ("pageSize".to_string(), state.page_size.to_string()),
        ];
        if let Some(sort) = &state.sort {
            query.push(("sort".to_string(), sort.clone()));
            query.push(("direction".to_string(), state.direction.as_str().to_string()));
        }
        for (field, value) in &state.filters {
            query.push((field.clone(), value.clone()));
        }

        let body: Value = self
            .client
            .get(format!("{}/api/users", self.base))
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await
            .map_err(|e| FetchError(e.to_string()))?
            .error_for_status()
            .map_err(|e| FetchError(e.to_string()))?
            .json()
            .await
            .map_err(|e| FetchError(e.to_string()))?;

        let rows = body["data"].as_array().cloned().unwrap_or_default();
        let count = body["count"].as_u64().unwrap_or(0);
        Ok(Page { rows, count })
    }
}

async fn login(client: &Client, base: &str) -> Result<String> {
    let username = env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());

    let body: Value = client
        .post(format!("{base}/api/auth/login"))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    body["data"]["token"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| anyhow!("login response carried no token"))
}

fn print_rows(label: &str, controller: &ListController<Value>) {
    println!("-- {label} (count: {:?})", controller.count());
    match controller.rows() {
        RowsState::Loaded(rows) => {
            for row in rows {
                println!(
                    "   {} {} ({})",
                    row["firstName"].as_str().unwrap_or("?"),
                    row["lastName"].as_str().unwrap_or("?"),
                    row["username"].as_str().unwrap_or("?"),
                );
            }
        }
        RowsState::Loading => println!("   still loading?!"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let base =
        env::var("FORECOURT_URL").unwrap_or_else(|_| "http://127.0.0.1:4000".to_string());

    let client = Client::new();
    let token = login(&client, &base).await?;
    println!("Logged in against {base}");

    let fetcher = HttpFetch {
        client,
        base,
        token,
    };

    let (mut controller, ticket) = ListController::new(10);
    match controller.refresh(&fetcher, ticket).await {
        Outcome::Applied => print_rows("first page", &controller),
        other => return Err(anyhow!("initial fetch failed: {other:?}")),
    }

    if let Some(ticket) = controller.toggle_sort("username") {
        controller.refresh(&fetcher, ticket).await;
        print_rows("sorted by username asc", &controller);
    }
    if let Some(ticket) = controller.toggle_sort("username") {
        controller.refresh(&fetcher, ticket).await;
        print_rows("sorted by username desc", &controller);
    }

    let mut filters = BTreeMap::new();
    filters.insert("username".to_string(), "admin".to_string());
    let ticket = controller.set_filters(filters);
    controller.refresh(&fetcher, ticket).await;
    print_rows("filtered to admin", &controller);

    println!("max pages: {:?}", controller.max_pages());
    Ok(())
}
