use std::{env, io};

use log::info;
use node::{AppConfig, Engine, MlTask};

fn main() -> io::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => AppConfig::from_path(&path)?,
        None => AppConfig::default(),
    };
    info!("running with {config:?}");

    let mut engine = Engine::new(config.engine.clone())?;
    let table_id = engine.create_table(config.table)?;
    engine.start()?;

    let iterations = config.iterations;
    let task = MlTask::new(move |info| {
        info!("{info}");
        let table = info.table(table_id)?;
        let key = [info.worker_id as u64];

        for i in 0..iterations {
            let mut vals = Vec::new();
            table.get(&key, &mut vals)?;
            info!(worker_id = info.worker_id, round = i; "read {vals:?}");

            table.add(&key, &[i as f32 + info.worker_id as f32])?;
            table.clock()?;
        }

        Ok(())
    })
    .with_worker_alloc(config.workers)
    .with_tables(vec![table_id]);

    engine.run(&task)?;
    engine.stop()?;
    Ok(())
}
