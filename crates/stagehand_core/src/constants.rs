pub mod routes {
    pub const HEALTH: &str = "/health";

    pub const ENVIRONMENTS: &str = "/environments";
    pub const ENVIRONMENT_JOB_BY_ID: &str = "/environments/jobs/{id}";
    pub const ENVIRONMENT_HISTORY: &str = "/environments/history";
}

pub mod labels {
    /// Carries the job id on every network and instance created for a job.
    pub const JOB: &str = "stagehand.job";
    /// Carries the namespace prefix shared by all resources of a job.
    pub const NAMESPACE: &str = "stagehand.namespace";
}

pub mod defaults {
    pub const NAMESPACE: &str = "odoo";
    pub const VERSION: &str = "19.0";

    pub const DATABASE_IMAGE: &str = "postgres:15";
    pub const DATABASE_USER: &str = "odoo";
    pub const DATABASE_MAINTENANCE_DB: &str = "postgres";

    pub const WORKLOAD_IMAGE: &str = "odoo";
    pub const WORKLOAD_PORT: u16 = 8069;
    pub const PUBLIC_HOST: &str = "localhost";

    pub const ADMIN_LOGIN: &str = "admin";
    pub const ADMIN_PASSWORD: &str = "admin";

    pub const EXTENSION_MOUNT: &str = "/mnt/extra-addons";
    pub const BASE_ADDONS_PATH: &str = "/usr/lib/python3/dist-packages/odoo/addons";
    /// File whose presence marks a directory as an installable extension.
    pub const MANIFEST_MARKER: &str = "__manifest__.py";
}
