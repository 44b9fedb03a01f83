//! Recording lookup and removal.

use camkit_capture_engine::MediaStore;
use camkit_common::config::AppConfig;

pub fn exists(config: &AppConfig, name: &str) -> anyhow::Result<()> {
    let store = MediaStore::from_config(config);
    if store.exists(name) {
        println!("{}", store.path_for(name)?.display());
    } else {
        println!("No recording named {name:?}");
    }
    Ok(())
}

pub fn delete(config: &AppConfig, name: &str) -> anyhow::Result<()> {
    let store = MediaStore::from_config(config);
    if store.delete(name)? {
        println!("Deleted {name:?}");
    } else {
        println!("No recording named {name:?}");
    }
    Ok(())
}
