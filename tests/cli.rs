use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

const ARM_SCOPE: &str = "https://management.core.windows.net//.default";

fn azctl(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("azctl").unwrap();
    cmd.current_dir(config_dir)
        .env("AZCTL_CONFIG_DIR", config_dir)
        .env_remove("AZCTL_CLOUD")
        .env_remove("AZCTL_LOG");
    cmd
}

fn subscription(id: &str, name: &str, tenant: &str, is_default: bool) -> Value {
    json!({
        "id": id,
        "name": name,
        "state": "Enabled",
        "tenantId": tenant,
        "tenantDefaultDomain": format!("{tenant}.onmicrosoft.com"),
        "homeTenantId": "home",
        "environmentName": "AzureCloud",
        "isDefault": is_default,
        "user": "user@contoso.com",
    })
}

fn seed_profile(dir: &Path) {
    let profile = json!({
        "subscriptions": [
            subscription("11111111-0000-0000-0000-000000000001", "Prod", "t1", true),
            subscription("11111111-0000-0000-0000-000000000002", "Dev", "t2", false),
        ],
        "authenticationRecord": {
            "authority": "https://login.microsoftonline.com",
            "homeAccountId": "oid.home",
            "tenantId": "home",
            "username": "user@contoso.com",
            "clientId": "04b07795-8ddb-461a-bbee-02f9e1bf7b46",
            "version": "1.0",
        },
    });
    fs::write(dir.join("profile.json"), profile.to_string()).unwrap();
}

fn seed_token(dir: &Path, tenant: &str, secret: &str) {
    let mut access_tokens = serde_json::Map::new();
    access_tokens.insert(
        format!("oid.home-{tenant}-{ARM_SCOPE}"),
        json!({
            "homeAccountId": "oid.home",
            "environment": "login.microsoftonline.com",
            "realm": tenant,
            "target": ARM_SCOPE,
            "secret": secret,
            "expiresOn": "2999-01-01T00:00:00Z",
        }),
    );
    let cache = json!({
        "accounts": {
            "oid.home": {
                "homeAccountId": "oid.home",
                "environment": "login.microsoftonline.com",
                "realm": "home",
                "username": "user@contoso.com",
            },
        },
        "accessTokens": access_tokens,
    });
    fs::write(dir.join("token_cache.json"), cache.to_string()).unwrap();
}

fn show_json(dir: &Path) -> Value {
    let output = azctl(dir)
        .args(["account", "show", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn show_without_login_asks_to_log_in() {
    let tmp = TempDir::new().unwrap();
    azctl(tmp.path())
        .args(["account", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("azctl login"));
}

#[test]
fn logout_without_login_succeeds() {
    let tmp = TempDir::new().unwrap();
    azctl(tmp.path()).arg("logout").assert().success();
}

#[test]
fn list_shows_saved_subscriptions() {
    let tmp = TempDir::new().unwrap();
    seed_profile(tmp.path());

    let output = azctl(tmp.path())
        .args(["account", "list", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let subscriptions: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(subscriptions.len(), 2);
    assert_eq!(subscriptions[0]["isDefault"], true);

    azctl(tmp.path())
        .args(["account", "list", "--no-pager"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Prod")
                .and(predicate::str::contains("Dev"))
                .and(predicate::str::contains("t1.onmicrosoft.com")),
        );
}

#[test]
fn set_changes_the_default() {
    let tmp = TempDir::new().unwrap();
    seed_profile(tmp.path());

    azctl(tmp.path())
        .args(["account", "set", "--subscription", "Dev"])
        .assert()
        .success();

    let shown = show_json(tmp.path());
    assert_eq!(shown["name"], "Dev");
    assert_eq!(shown["isDefault"], true);

    let profile: Value =
        serde_json::from_str(&fs::read_to_string(tmp.path().join("profile.json")).unwrap()).unwrap();
    let defaults = profile["subscriptions"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|s| s["isDefault"] == true)
        .count();
    assert_eq!(defaults, 1);
}

#[test]
fn set_unknown_subscription_fails() {
    let tmp = TempDir::new().unwrap();
    seed_profile(tmp.path());

    azctl(tmp.path())
        .args(["account", "set", "--subscription", "Staging"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn clear_removes_profile_and_token_cache() {
    let tmp = TempDir::new().unwrap();
    seed_profile(tmp.path());
    seed_token(tmp.path(), "t1", "cached-access-token");

    azctl(tmp.path()).args(["account", "clear"]).assert().success();
    assert!(!tmp.path().join("profile.json").exists());
    assert!(!tmp.path().join("token_cache.json").exists());

    azctl(tmp.path())
        .args(["account", "get-access-token"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("azctl login"));
}

#[test]
fn access_token_comes_from_the_cache_for_the_default_tenant() {
    let tmp = TempDir::new().unwrap();
    seed_profile(tmp.path());
    seed_token(tmp.path(), "t1", "cached-access-token");

    let output = azctl(tmp.path())
        .args(["account", "get-access-token", "--json", "--show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let token: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(token["accessToken"], "cached-access-token");
    assert_eq!(token["tenant"], "t1");
    assert_eq!(token["subscription"], "11111111-0000-0000-0000-000000000001");

    azctl(tmp.path())
        .args(["account", "get-access-token"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cach...oken"));
}

#[test]
fn login_rejects_unknown_cloud() {
    let tmp = TempDir::new().unwrap();
    azctl(tmp.path())
        .args(["login", "--cloud", "Moon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown cloud"));
}

#[test]
fn env_file_settings_are_applied() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".env"), "AZCTL_CLOUD=Moon\nUNRELATED=1\n").unwrap();

    azctl(tmp.path())
        .arg("login")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown cloud"));
}
