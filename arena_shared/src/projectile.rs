//! Time-limited projectiles.

use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use crate::{
    entity::{Collidable, EntityRef, Impact, Movable, PlayerId, ProjectileId},
    flag::{Flag, FlagSet},
    math::{cos_deg, sin_deg, Polygon, Vec2},
};

/// How long a projectile lives when it hits nothing.
pub const PROJECTILE_LIFETIME: Duration = Duration::from_secs(3);

/// Shape and speed presets for each projectile sprite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileKind {
    Arrow,
}

impl ProjectileKind {
    fn shape(self) -> Polygon {
        match self {
            // Shaft with a pointed head along +x, pivot at the shaft center.
            ProjectileKind::Arrow => Polygon::new(vec![
                Vec2::new(0.0, 2.0),
                Vec2::new(26.0, 2.0),
                Vec2::new(32.0, 4.0),
                Vec2::new(26.0, 6.0),
                Vec2::new(0.0, 6.0),
            ])
            .with_origin(Vec2::new(16.0, 4.0)),
        }
    }

    fn movement_speed(self) -> f32 {
        match self {
            ProjectileKind::Arrow => 10.0,
        }
    }

    fn rotation_speed(self) -> f32 {
        match self {
            ProjectileKind::Arrow => 5.0,
        }
    }
}

/// A moving, collidable entity that expires on its own.
#[derive(Debug, Clone)]
pub struct Projectile {
    id: ProjectileId,
    kind: ProjectileKind,
    source: PlayerId,
    body: Polygon,
    movement_speed: f32,
    rotation_speed: f32,
    ignores: HashSet<EntityRef>,
    flags: FlagSet,
    created_at: Instant,
    spent: bool,
}

impl Projectile {
    pub fn builder(kind: ProjectileKind, source: PlayerId) -> ProjectileBuilder {
        ProjectileBuilder {
            kind,
            source,
            x: 0.0,
            y: 0.0,
            angle: 0.0,
            movement_speed: kind.movement_speed(),
            rotation_speed: kind.rotation_speed(),
            ignores: HashSet::from([EntityRef::Player(source)]),
        }
    }

    pub fn id(&self) -> ProjectileId {
        self.id
    }

    pub fn kind(&self) -> ProjectileKind {
        self.kind
    }

    pub fn source(&self) -> PlayerId {
        self.source
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    /// Whether `entity` is exempt from collisions with this projectile.
    pub fn ignores(&self, entity: EntityRef) -> bool {
        entity == EntityRef::Projectile(self.id) || self.ignores.contains(&entity)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= PROJECTILE_LIFETIME
    }

    /// Set once another projectile hits this one.
    pub fn is_spent(&self) -> bool {
        self.spent
    }

    pub fn impact(&self) -> Impact {
        Impact {
            projectile: self.id,
            source: self.source,
        }
    }

    pub fn process_flags(&mut self) {
        let mut flags = std::mem::take(&mut self.flags);
        flags.process(self);
        self.flags = flags;
    }

    fn step(&self, direction: f32) -> (f32, f32) {
        let angle = self.rotation();
        (
            direction * self.movement_speed * cos_deg(angle),
            direction * self.movement_speed * sin_deg(angle),
        )
    }
}

impl Movable for Projectile {
    fn x(&self) -> f32 {
        self.body.position().x
    }

    fn y(&self) -> f32 {
        self.body.position().y
    }

    fn set_x(&mut self, x: f32) {
        let y = self.y();
        self.body.set_position(x, y);
    }

    fn set_y(&mut self, y: f32) {
        let x = self.x();
        self.body.set_position(x, y);
    }

    fn rotation(&self) -> f32 {
        self.body.rotation()
    }

    fn set_rotation(&mut self, degrees: f32) {
        self.body.set_rotation(degrees);
    }

    /// Opposite sense to players: projectiles turn left clockwise.
    fn rotate_left(&mut self) {
        self.body.rotate(-self.rotation_speed);
    }

    fn rotate_right(&mut self) {
        self.body.rotate(self.rotation_speed);
    }

    fn move_forward(&mut self) {
        let (dx, dy) = self.step(1.0);
        self.body.translate(dx, dy);
    }

    fn move_back(&mut self) {
        let (dx, dy) = self.step(-1.0);
        self.body.translate(dx, dy);
    }
}

impl Collidable for Projectile {
    fn polygon(&self) -> &Polygon {
        &self.body
    }

    fn collide(&mut self, _impact: &Impact) {
        self.spent = true;
    }
}

/// Launch parameters for a [`Projectile`].
#[derive(Debug, Clone)]
pub struct ProjectileBuilder {
    kind: ProjectileKind,
    source: PlayerId,
    x: f32,
    y: f32,
    angle: f32,
    movement_speed: f32,
    rotation_speed: f32,
    ignores: HashSet<EntityRef>,
}

impl ProjectileBuilder {
    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn angle(mut self, degrees: f32) -> Self {
        self.angle = degrees;
        self
    }

    pub fn movement_speed(mut self, speed: f32) -> Self {
        self.movement_speed = speed;
        self
    }

    pub fn rotation_speed(mut self, speed: f32) -> Self {
        self.rotation_speed = speed;
        self
    }

    pub fn ignoring(mut self, entity: EntityRef) -> Self {
        self.ignores.insert(entity);
        self
    }

    /// Spawns the projectile with `MoveForward` already raised.
    pub fn build(self, id: ProjectileId, created_at: Instant) -> Projectile {
        let mut body = self.kind.shape();
        body.set_position(self.x, self.y);
        body.set_rotation(self.angle);

        let mut flags = FlagSet::new();
        flags.press(Flag::MoveForward);

        Projectile {
            id,
            kind: self.kind,
            source: self.source,
            body,
            movement_speed: self.movement_speed,
            rotation_speed: self.rotation_speed,
            ignores: self.ignores,
            flags,
            created_at,
            spent: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrow(angle: f32, now: Instant) -> Projectile {
        Projectile::builder(ProjectileKind::Arrow, PlayerId(1))
            .at(10.0, 20.0)
            .angle(angle)
            .build(ProjectileId(0), now)
    }

    #[test]
    fn starts_moving_forward() {
        let mut p = arrow(0.0, Instant::now());
        assert!(p.flags().is_active(Flag::MoveForward));
        p.process_flags();
        assert!((p.x() - 20.0).abs() < 1e-4);
        assert!((p.y() - 20.0).abs() < 1e-4);
    }

    #[test]
    fn no_boundary_clamp() {
        let mut p = arrow(180.0, Instant::now());
        p.set_x(-10_000.0);
        p.move_forward();
        assert!(p.x() < -10_000.0);
    }

    #[test]
    fn expiry_is_inclusive_at_three_seconds() {
        let t0 = Instant::now();
        let p = arrow(0.0, t0);
        assert!(!p.is_expired(t0 + Duration::from_millis(2900)));
        assert!(p.is_expired(t0 + PROJECTILE_LIFETIME));
    }

    #[test]
    fn ignores_shooter_and_itself() {
        let p = arrow(0.0, Instant::now());
        assert!(p.ignores(EntityRef::Player(PlayerId(1))));
        assert!(p.ignores(EntityRef::Projectile(ProjectileId(0))));
        assert!(!p.ignores(EntityRef::Player(PlayerId(2))));
    }

    #[test]
    fn polygon_tracks_translation() {
        let mut p = arrow(90.0, Instant::now());
        p.move_back();
        assert_eq!(p.polygon().position().y, p.y());
        assert!((p.y() - 10.0).abs() < 1e-4);
    }

    #[test]
    fn rotation_runs_opposite_to_players() {
        let mut p = arrow(90.0, Instant::now());
        p.rotate_left();
        assert_eq!(p.rotation(), 90.0 - ProjectileKind::Arrow.rotation_speed());
        p.rotate_right();
        p.rotate_right();
        assert_eq!(p.rotation(), 90.0 + ProjectileKind::Arrow.rotation_speed());
    }
}
