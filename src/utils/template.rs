//! `{{var}}` template rendering.

pub struct TemplateVars;

impl TemplateVars {
    pub const INFOBASE: &'static str = "infobase";
    pub const IB_USER: &'static str = "ib_user";
    pub const IB_PASSWORD: &'static str = "ib_password";
    pub const STORE_PATH: &'static str = "store_path";
    pub const STORE_USER: &'static str = "store_user";
    pub const STORE_PASSWORD: &'static str = "store_password";
    pub const DB_SERVER: &'static str = "db_server";
    pub const DB_NAME: &'static str = "db_name";
    pub const DB_USER: &'static str = "db_user";
    pub const DB_PASSWORD: &'static str = "db_password";
    pub const SOURCE_DIR: &'static str = "source_dir";
    pub const TARGET_DIR: &'static str = "target_dir";
    pub const FILE: &'static str = "file";
    pub const BRANCH: &'static str = "branch";
    pub const MESSAGE: &'static str = "message";
    pub const PERMISSION_CODE: &'static str = "permission_code";
    pub const PROJECT_KEY: &'static str = "project_key";
    pub const HOST_URL: &'static str = "host_url";
    pub const TOKEN: &'static str = "token";
    pub const DIRECTION: &'static str = "direction";
}

pub fn render(template: &str, variables: &[(&str, &str)]) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}

/// Placeholders still present in `text`, e.g. `{{db_name}}` with no value.
pub fn unresolved(text: &str) -> Vec<String> {
    let mut missing = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                missing.push(after[..end].to_string());
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    missing
}
