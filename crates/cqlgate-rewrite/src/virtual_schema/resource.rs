//! Permission resource names, in both the stored form (`data/ks/t`) and the
//! rendered form used by LIST PERMISSIONS (`<table ks.t>`).

/// Rename the keyspace and role parts of a resource.
///
/// `keyspace` and `role` return `None` for a name the caller must not see;
/// the whole resource then maps to `None`. Unknown shapes also map to `None`.
pub fn map_resource<K, R>(value: &str, keyspace: K, role: R) -> Option<String>
where
    K: Fn(&str) -> Option<String>,
    R: Fn(&str) -> Option<String>,
{
    if let Some(inner) = value.strip_prefix('<').and_then(|v| v.strip_suffix('>')) {
        return map_rendered(inner, keyspace, role).map(|inner| format!("<{inner}>"));
    }
    map_stored(value, keyspace, role)
}

fn map_stored<K, R>(value: &str, keyspace: K, role: R) -> Option<String>
where
    K: Fn(&str) -> Option<String>,
    R: Fn(&str) -> Option<String>,
{
    let mut parts = value.splitn(3, '/');
    let root = parts.next()?;
    let first = parts.next();
    let rest = parts.next();

    match (root, first, rest) {
        ("data" | "roles" | "functions" | "mbean", None, None) => Some(value.to_string()),
        ("data" | "functions", Some(ks), None) => Some(format!("{root}/{}", keyspace(ks)?)),
        ("data" | "functions", Some(ks), Some(rest)) => {
            Some(format!("{root}/{}/{rest}", keyspace(ks)?))
        }
        ("roles", Some(name), None) => Some(format!("roles/{}", role(name)?)),
        ("mbean", Some(_), _) => Some(value.to_string()),
        _ => None,
    }
}

fn map_rendered<K, R>(inner: &str, keyspace: K, role: R) -> Option<String>
where
    K: Fn(&str) -> Option<String>,
    R: Fn(&str) -> Option<String>,
{
    match inner {
        "all keyspaces" | "all roles" | "all functions" | "all mbeans" => {
            return Some(inner.to_string());
        }
        _ => {}
    }

    if let Some(ks) = inner.strip_prefix("keyspace ") {
        return Some(format!("keyspace {}", keyspace(ks)?));
    }
    if let Some(name) = inner.strip_prefix("table ") {
        let (ks, table) = name.split_once('.')?;
        return Some(format!("table {}.{table}", keyspace(ks)?));
    }
    if let Some(name) = inner.strip_prefix("role ") {
        return Some(format!("role {}", role(name)?));
    }
    if let Some(ks) = inner.strip_prefix("all functions in ") {
        return Some(format!("all functions in {}", keyspace(ks)?));
    }
    if let Some(name) = inner.strip_prefix("function ") {
        let (ks, signature) = name.split_once('.')?;
        return Some(format!("function {}.{signature}", keyspace(ks)?));
    }
    if inner.starts_with("mbean ") {
        return Some(inner.to_string());
    }

    None
}
