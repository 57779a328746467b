//! Jazz Actors demo entry point
//!
//! Builds a small level in memory and runs it headless with a fixed
//! timestep, logging what the actors do. Pass a settings JSON path as the
//! first argument to override the defaults.

use glam::{IVec2, Vec2};

use jazz_actors::consts::{MAX_SUBSTEPS, SIM_DT};
use jazz_actors::content::InMemorySource;
use jazz_actors::settings::Settings;
use jazz_actors::sim::{
    AmmoCrate, EventType, Level, LevelEvent, Player, PushableBox, Shot, TileMap, WeaponType,
    event_params,
};
use jazz_actors::time_mult_from_secs;

/// Host frame length; deliberately not a multiple of the simulation step
const HOST_DT: f32 = 1.0 / 50.0;
const HOST_FRAMES: u32 = 300;

const MAP: [&str; 6] = [
    "....................",
    "....................",
    "....................",
    "....................",
    ".............x......",
    "####################",
];

/// Fixed-timestep driver around a level
struct Game {
    level: Level,
    player: jazz_actors::sim::ActorId,
    accumulator: f32,
    frames: u32,
}

impl Game {
    fn new(settings: &Settings) -> Self {
        let mut level = Level::new(settings, TileMap::from_rows(&MAP), InMemorySource::stock());

        let mut player = Player::new(0);
        player.ammo[WeaponType::Seeker.index()] = 10;
        let player = level.add_player(player, Vec2::new(40.0, 140.0));
        level.add_actor(Box::new(PushableBox::new()), Vec2::new(112.0, 144.0), 0);
        level.add_actor(Box::new(AmmoCrate::new()), Vec2::new(400.0, 145.0), 0);
        level.event_map_mut().store_tile_event(
            IVec2::new(17, 4),
            EventType::PowerUpWeapon,
            event_params(&[WeaponType::RF as u8]),
        );
        level.preload_event_map();
        level.place_events();
        level.finish_activations();

        Self {
            level,
            player,
            accumulator: 0.0,
            frames: 0,
        }
    }

    /// Run simulation ticks for one host frame
    fn update(&mut self, dt: f32) {
        let dt = dt.min(0.1);
        self.accumulator += dt;

        let mut substeps = 0;
        while self.accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
            self.drive_player();
            self.level.update(time_mult_from_secs(SIM_DT));
            self.accumulator -= SIM_DT;
            substeps += 1;
            self.frames += 1;
        }

        for event in self.level.drain_events() {
            log_event(&event);
        }
    }

    /// Walk right, then fire at whatever is ahead every second
    fn drive_player(&mut self) {
        let frames = self.frames;
        let Some(player) = self.level.player_mut(self.player) else {
            return;
        };
        player.walk = if frames < 240 { 1.0 } else { 0.0 };
        if frames < 240 || frames % 60 != 0 {
            return;
        }

        let pos = player.base.pos;
        let shot = Shot::new(Some(self.player), WeaponType::RF).with_speed(Vec2::new(8.0, 0.0));
        self.level.add_actor(Box::new(shot), pos + Vec2::new(16.0, 0.0), 0);
    }
}

fn log_event(event: &LevelEvent) {
    match event {
        LevelEvent::CarryChanged { player, object } => {
            log::info!("Player {} carried by {:?}", player, object)
        }
        LevelEvent::Perished { id, collider } => {
            log::info!("Actor {} perished (collider {:?})", id, collider)
        }
        LevelEvent::Score { player, amount } => log::info!("Player {} scored {}", player, amount),
        LevelEvent::ActivationFailed { event_type } => {
            log::warn!("Activation failed for {:?}", event_type)
        }
        other => log::debug!("{:?}", other),
    }
}

fn main() {
    #[cfg(not(target_arch = "wasm32"))]
    env_logger::init();

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(path),
        None => Settings::default(),
    };
    log::info!("Jazz Actors demo starting ({} ruleset)", settings.ruleset.as_str());

    let mut game = Game::new(&settings);
    for _ in 0..HOST_FRAMES {
        game.update(HOST_DT);
    }

    if let Some(player) = game.level.player(game.player) {
        log::info!(
            "Finished after {} frames: {} actors, player at {:?}, score {}",
            game.frames,
            game.level.actor_count(),
            player.base.pos,
            player.score
        );
    }
}
