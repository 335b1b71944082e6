pub const APP_ID: &str = "dev.neura.Neura";
pub const APP_NAME: &str = "neura";
