/// Decides whether a tenant may act on every tenant's scripts.
pub trait Authorizer: Send + Sync {
    fn is_privileged(&self, tenant: &str) -> bool;
}

/// Privilege from a fixed list of admin tenant ids (the `ADMINS` variable).
#[derive(Debug, Clone, Default)]
pub struct AdminList {
    admins: Vec<String>,
}

impl AdminList {
    pub fn new(admins: Vec<String>) -> Self {
        AdminList { admins }
    }
}

impl Authorizer for AdminList {
    fn is_privileged(&self, tenant: &str) -> bool {
        self.admins.iter().any(|admin| admin == tenant)
    }
}
