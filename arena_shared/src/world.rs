//! Entity registry and per-tick simulation.
//!
//! The world owns every player and live projectile. It is single-writer:
//! packet handlers and the tick both take `&mut World`, so whoever owns the
//! world (the client session or the server loop) is the only place state
//! changes.

use std::{
    collections::{BTreeMap, HashMap},
    time::Instant,
};

use tracing::{debug, trace};

use crate::{
    config::WorldBounds,
    entity::{Collidable, EntityRef, GameId, Impact, Movable, PlayerId, ProjectileId},
    keys::{Action, KeyCode},
    player::Player,
    projectile::{Projectile, ProjectileBuilder, ProjectileKind},
};

/// Why a projectile left the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Expired(ProjectileId),
    Collided(ProjectileId),
}

impl Removal {
    pub fn projectile(self) -> ProjectileId {
        match self {
            Removal::Expired(id) | Removal::Collided(id) => id,
        }
    }
}

/// Registry of players and projectiles.
pub struct World {
    bounds: WorldBounds,
    players: HashMap<PlayerId, Player>,
    projectiles: BTreeMap<ProjectileId, Projectile>,
    /// Draw order for the render collaborator.
    drawables: Vec<EntityRef>,
    next_projectile: u64,
    now: Instant,
}

impl World {
    pub fn new(bounds: WorldBounds) -> Self {
        Self::starting_at(bounds, Instant::now())
    }

    /// Creates a world whose clock starts at `now`.
    pub fn starting_at(bounds: WorldBounds, now: Instant) -> Self {
        Self {
            bounds,
            players: HashMap::new(),
            projectiles: BTreeMap::new(),
            drawables: Vec::new(),
            next_projectile: 0,
            now,
        }
    }

    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    /// Time of the last tick.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Creates a player, or moves the existing one with that id.
    pub fn spawn_player(&mut self, game_id: GameId, id: PlayerId, x: f32, y: f32) -> &mut Player {
        let bounds = self.bounds;
        let drawables = &mut self.drawables;
        let player = self.players.entry(id).or_insert_with(|| {
            debug!(player_id = ?id, x, y, "Player created");
            drawables.push(EntityRef::Player(id));
            Player::new(game_id, id, bounds)
        });
        player.set_x(x);
        player.set_y(y);
        player
    }

    /// Returns the player, creating one at the origin if the id is unseen.
    pub fn player_or_spawn(&mut self, game_id: GameId, id: PlayerId) -> &mut Player {
        let bounds = self.bounds;
        let drawables = &mut self.drawables;
        self.players.entry(id).or_insert_with(|| {
            debug!(player_id = ?id, "Unknown player referenced, creating lazily");
            drawables.push(EntityRef::Player(id));
            Player::new(game_id, id, bounds)
        })
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            self.drawables.retain(|e| *e != EntityRef::Player(id));
        }
        removed
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Player ids in ascending order.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<_> = self.players.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn projectile(&self, id: ProjectileId) -> Option<&Projectile> {
        self.projectiles.get(&id)
    }

    pub fn projectiles(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.values()
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    pub fn drawables(&self) -> &[EntityRef] {
        &self.drawables
    }

    /// Routes a key press to the player's binding. Unbound keys do nothing.
    pub fn key_pressed(&mut self, id: PlayerId, key: KeyCode) -> Option<Action> {
        let player = self.players.get_mut(&id)?;
        let action = player.key_pressed(key)?;
        if action == Action::LaunchProjectile {
            let builder = Projectile::builder(ProjectileKind::Arrow, id)
                .at(player.x(), player.y())
                .angle(player.rotation());
            self.launch_projectile(builder);
        }
        Some(action)
    }

    pub fn key_unpressed(&mut self, id: PlayerId, key: KeyCode) -> Option<Action> {
        self.players.get_mut(&id)?.key_unpressed(key)
    }

    /// Adds a projectile to both the live set and the draw list.
    pub fn launch_projectile(&mut self, builder: ProjectileBuilder) -> ProjectileId {
        let id = ProjectileId(self.next_projectile);
        self.next_projectile += 1;
        let projectile = builder.build(id, self.now);
        debug!(projectile = ?id, source = ?projectile.source(), "Projectile launched");
        self.projectiles.insert(id, projectile);
        self.drawables.push(EntityRef::Projectile(id));
        id
    }

    /// Removes a projectile from both the live set and the draw list.
    pub fn remove_projectile(&mut self, id: ProjectileId) -> Option<Projectile> {
        let removed = self.projectiles.remove(&id);
        if removed.is_some() {
            self.drawables.retain(|e| *e != EntityRef::Projectile(id));
        }
        removed
    }

    /// One simulation step: flags first, then collisions and expiry.
    pub fn tick(&mut self, now: Instant) -> Vec<Removal> {
        self.now = now;
        for player in self.players.values_mut() {
            player.process_flags();
        }
        for projectile in self.projectiles.values_mut() {
            projectile.process_flags();
        }
        self.update_projectiles()
    }

    /// Expires old projectiles and delivers collisions for the rest.
    ///
    /// Every non-ignored collidable a projectile overlaps gets `collide`; the
    /// projectile itself is removed afterwards.
    pub fn update_projectiles(&mut self) -> Vec<Removal> {
        let now = self.now;
        let mut removals = Vec::new();
        let mut hits: Vec<(Impact, EntityRef)> = Vec::new();

        for projectile in self.projectiles.values() {
            if projectile.is_expired(now) {
                removals.push(Removal::Expired(projectile.id()));
                continue;
            }
            if projectile.is_spent() {
                removals.push(Removal::Collided(projectile.id()));
                continue;
            }

            let mut hit_any = false;
            for target in self.collidables() {
                if projectile.ignores(target) || self.same_shooter(projectile, target) {
                    continue;
                }
                let Some(shape) = self.shape_of(target) else {
                    continue;
                };
                if projectile.polygon().overlaps(shape) {
                    trace!(projectile = ?projectile.id(), ?target, "Overlap");
                    hits.push((projectile.impact(), target));
                    hit_any = true;
                }
            }
            if hit_any {
                removals.push(Removal::Collided(projectile.id()));
            }
        }

        for (impact, target) in hits {
            match target {
                EntityRef::Player(id) => {
                    if let Some(player) = self.players.get_mut(&id) {
                        player.collide(&impact);
                        debug!(player_id = ?id, by = ?impact.source, "Player hit");
                    }
                }
                EntityRef::Projectile(id) => {
                    if let Some(other) = self.projectiles.get_mut(&id) {
                        other.collide(&impact);
                    }
                    // A target visited earlier in this pass leaves now too.
                    if !removals.iter().any(|r| r.projectile() == id) {
                        removals.push(Removal::Collided(id));
                    }
                }
            }
        }

        for removal in &removals {
            self.remove_projectile(removal.projectile());
        }
        removals
    }

    /// Projectiles from one shooter pass through each other.
    fn same_shooter(&self, projectile: &Projectile, target: EntityRef) -> bool {
        match target {
            EntityRef::Projectile(id) => self
                .projectiles
                .get(&id)
                .is_some_and(|other| other.source() == projectile.source()),
            EntityRef::Player(_) => false,
        }
    }

    fn collidables(&self) -> Vec<EntityRef> {
        let mut targets: Vec<_> = self.player_ids().into_iter().map(EntityRef::Player).collect();
        targets.extend(
            self.projectiles
                .values()
                .filter(|p| !p.is_spent())
                .map(|p| EntityRef::Projectile(p.id())),
        );
        targets
    }

    fn shape_of(&self, target: EntityRef) -> Option<&crate::math::Polygon> {
        match target {
            EntityRef::Player(id) => self.players.get(&id).map(|p| p.polygon()),
            EntityRef::Projectile(id) => self.projectiles.get(&id).map(|p| p.polygon()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::flag::Flag;

    const GAME: GameId = GameId(1);

    fn world() -> (World, Instant) {
        let t0 = Instant::now();
        (World::starting_at(WorldBounds::default(), t0), t0)
    }

    #[test]
    fn spawn_twice_does_not_duplicate() {
        let (mut w, _) = world();
        w.spawn_player(GAME, PlayerId(1), 0.0, 0.0);
        w.spawn_player(GAME, PlayerId(1), 3.0, 4.0);
        assert_eq!(w.player_count(), 1);
        assert_eq!(w.drawables().len(), 1);
        assert_eq!(w.player(PlayerId(1)).unwrap().x(), 3.0);
    }

    #[test]
    fn unknown_key_target_is_ignored() {
        let (mut w, _) = world();
        assert_eq!(w.key_pressed(PlayerId(9), KeyCode::UP), None);
    }

    #[test]
    fn tick_applies_flags_with_release_lag() {
        let (mut w, t0) = world();
        w.spawn_player(GAME, PlayerId(1), 0.0, 0.0);
        w.key_pressed(PlayerId(1), KeyCode::UP);
        w.tick(t0);
        w.key_unpressed(PlayerId(1), KeyCode::UP);
        w.tick(t0);
        w.tick(t0);
        let p = w.player(PlayerId(1)).unwrap();
        assert!((p.x() - 10.0).abs() < 1e-4);
        assert!(!p.flags().is_active(Flag::MoveForward));
    }

    #[test]
    fn launched_projectile_expires_after_lifetime() {
        let (mut w, t0) = world();
        w.spawn_player(GAME, PlayerId(1), 0.0, 0.0);
        w.key_pressed(PlayerId(1), KeyCode::T);
        assert_eq!(w.projectile_count(), 1);

        w.tick(t0 + Duration::from_millis(2900));
        assert_eq!(w.projectile_count(), 1);

        let removed = w.tick(t0 + Duration::from_millis(3100));
        assert_eq!(removed, vec![Removal::Expired(ProjectileId(0))]);
        assert_eq!(w.projectile_count(), 0);
        assert_eq!(w.drawables(), &[EntityRef::Player(PlayerId(1))]);
    }

    #[test]
    fn shooter_is_never_hit_by_own_projectile() {
        let (mut w, t0) = world();
        w.spawn_player(GAME, PlayerId(1), 0.0, 0.0);
        let id = w.launch_projectile(
            Projectile::builder(ProjectileKind::Arrow, PlayerId(1))
                .at(0.0, 0.0)
                .movement_speed(0.0),
        );
        w.tick(t0);
        assert!(w.projectile(id).is_some());
        assert_eq!(w.player(PlayerId(1)).unwrap().hits_taken(), 0);
    }

    #[test]
    fn extra_ignores_are_honored() {
        let (mut w, t0) = world();
        w.spawn_player(GAME, PlayerId(1), 0.0, 0.0);
        w.spawn_player(GAME, PlayerId(2), 0.0, 0.0);
        w.launch_projectile(
            Projectile::builder(ProjectileKind::Arrow, PlayerId(1))
                .at(0.0, 0.0)
                .movement_speed(0.0)
                .ignoring(EntityRef::Player(PlayerId(2))),
        );
        w.tick(t0);
        assert_eq!(w.projectile_count(), 1);
        assert_eq!(w.player(PlayerId(2)).unwrap().hits_taken(), 0);
    }

    #[test]
    fn hit_player_collides_and_projectile_is_removed() {
        let (mut w, t0) = world();
        w.spawn_player(GAME, PlayerId(1), 0.0, 0.0);
        w.spawn_player(GAME, PlayerId(2), 20.0, 0.0);
        w.launch_projectile(
            Projectile::builder(ProjectileKind::Arrow, PlayerId(1))
                .at(20.0, 10.0)
                .movement_speed(0.0),
        );
        let removed = w.tick(t0);
        assert_eq!(removed, vec![Removal::Collided(ProjectileId(0))]);
        let victim = w.player(PlayerId(2)).unwrap();
        assert_eq!(victim.hits_taken(), 1);
        assert_eq!(victim.last_hit_by(), Some(PlayerId(1)));
        assert_eq!(w.drawables().len(), 2);
    }

    #[test]
    fn every_overlapping_target_is_told() {
        let (mut w, t0) = world();
        w.spawn_player(GAME, PlayerId(1), -500.0, -500.0);
        w.spawn_player(GAME, PlayerId(2), 0.0, 0.0);
        w.spawn_player(GAME, PlayerId(3), 5.0, 5.0);
        w.launch_projectile(
            Projectile::builder(ProjectileKind::Arrow, PlayerId(1))
                .at(10.0, 10.0)
                .movement_speed(0.0),
        );
        w.tick(t0);
        assert_eq!(w.player(PlayerId(2)).unwrap().hits_taken(), 1);
        assert_eq!(w.player(PlayerId(3)).unwrap().hits_taken(), 1);
    }

    #[test]
    fn crossing_projectiles_destroy_each_other() {
        let (mut w, t0) = world();
        w.spawn_player(GAME, PlayerId(1), -300.0, 200.0);
        w.spawn_player(GAME, PlayerId(2), 300.0, 200.0);
        for (shooter, x) in [(PlayerId(1), 0.0), (PlayerId(2), 4.0)] {
            w.launch_projectile(
                Projectile::builder(ProjectileKind::Arrow, shooter)
                    .at(x, 0.0)
                    .movement_speed(0.0),
            );
        }
        w.tick(t0);
        assert_eq!(w.projectile_count(), 0);
    }

    #[test]
    fn rapid_fire_arrows_do_not_destroy_each_other() {
        let (mut w, t0) = world();
        w.spawn_player(GAME, PlayerId(1), 0.0, 0.0);
        w.key_pressed(PlayerId(1), KeyCode::T);
        w.tick(t0);
        w.key_pressed(PlayerId(1), KeyCode::T);
        w.tick(t0);
        w.tick(t0);
        assert_eq!(w.projectile_count(), 2);
    }

    #[test]
    fn projectile_hit_after_its_own_turn_leaves_same_pass() {
        let (mut w, t0) = world();
        w.spawn_player(GAME, PlayerId(1), -300.0, 200.0);
        w.spawn_player(GAME, PlayerId(2), 300.0, 200.0);
        // Visited first, and blind to the arrow that hits it.
        let first = w.launch_projectile(
            Projectile::builder(ProjectileKind::Arrow, PlayerId(2))
                .at(4.0, 0.0)
                .movement_speed(0.0)
                .ignoring(EntityRef::Projectile(ProjectileId(1))),
        );
        let second = w.launch_projectile(
            Projectile::builder(ProjectileKind::Arrow, PlayerId(1))
                .at(0.0, 0.0)
                .movement_speed(0.0),
        );

        let removed = w.tick(t0);
        assert_eq!(
            removed,
            vec![Removal::Collided(second), Removal::Collided(first)]
        );
        assert_eq!(w.projectile_count(), 0);
        assert_eq!(
            w.drawables(),
            &[EntityRef::Player(PlayerId(1)), EntityRef::Player(PlayerId(2))]
        );
    }
}
