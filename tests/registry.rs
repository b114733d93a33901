use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant, SystemTime},
};

use hcteams::{
    config::AppConfig,
    dao::{
        memory::MemoryRepository,
        models::{TeamEntity, UserEntity},
    },
    error::ServiceError,
    services::{
        team_service::{TeamService, TickEvent},
        user_service::UserService,
    },
    team::{
        Role,
        territory::{Hq, Region, Vec3},
        tickable::{KothEvent, KothState, KothTick},
    },
    world::{Broadcaster, PlayerSession, Spatial},
};

#[derive(Default)]
struct Chat(Mutex<Vec<(Vec<String>, String)>>);

impl Broadcaster for Chat {
    fn broadcast(&self, xuids: &[String], message: &str) {
        self.0
            .lock()
            .unwrap()
            .push((xuids.to_vec(), message.to_owned()));
    }
}

impl Chat {
    fn saw(&self, xuid: &str, message: &str) -> bool {
        self.0
            .lock()
            .unwrap()
            .iter()
            .any(|(to, text)| text == message && to.iter().any(|x| x == xuid))
    }
}

#[derive(Default)]
struct World(Mutex<HashMap<String, Vec3>>);

impl World {
    fn stand(&self, xuid: &str, position: Vec3) {
        self.0.lock().unwrap().insert(xuid.to_owned(), position);
    }
}

impl Spatial for World {
    fn location(&self, xuid: &str) -> Option<(String, Vec3)> {
        let positions = self.0.lock().unwrap();
        positions
            .get(xuid)
            .map(|position| ("overworld".to_owned(), *position))
    }

    fn players_within(&self, world: &str, region: &Region) -> Vec<String> {
        if world != "overworld" {
            return Vec::new();
        }
        let positions = self.0.lock().unwrap();
        let mut inside: Vec<String> = positions
            .iter()
            .filter(|(_, position)| region.contains(**position))
            .map(|(xuid, _)| xuid.clone())
            .collect();
        inside.sort();
        inside
    }
}

fn player(xuid: &str, name: &str) -> PlayerSession {
    PlayerSession {
        xuid: xuid.into(),
        name: name.into(),
    }
}

fn teams_over(store: &MemoryRepository<TeamEntity>, chat: Arc<Chat>) -> TeamService {
    TeamService::new(
        Arc::new(store.clone()),
        Arc::new(AppConfig::default()),
        chat,
    )
}

#[tokio::test]
async fn teams_survive_a_restart() {
    let store = MemoryRepository::<TeamEntity>::new();
    let chat = Arc::new(Chat::default());
    let (steve, alex) = (player("P1", "Steve"), player("P2", "Alex"));

    let alpha_id = {
        let teams = teams_over(&store, chat.clone());
        let alpha = teams.create_player_team("P1", "Alpha").await.unwrap();
        teams.invite(&steve, &alex).unwrap();
        teams.accept(&alex, "alpha").unwrap();
        teams.promote(&steve, &alex).unwrap();
        teams
            .claim(
                alpha.tracker().id(),
                "overworld",
                Region::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(32.0, 256.0, 32.0)),
            )
            .unwrap();
        teams
            .set_home(
                &steve,
                Hq {
                    world: "overworld".into(),
                    position: Vec3::new(10.0, 64.0, 10.0),
                    yaw: 90.0,
                    pitch: 0.0,
                },
            )
            .unwrap();
        teams.shutdown().await.unwrap();
        alpha.tracker().id().to_owned()
    };

    let teams = teams_over(&store, chat);
    assert_eq!(teams.hook().await.unwrap(), 1);
    let alpha = teams.lookup_by_member("P2").unwrap().unwrap();
    assert_eq!(alpha.tracker().id(), alpha_id);
    assert_eq!(alpha.member("P1"), Role::Leader);
    assert_eq!(alpha.member("P2"), Role::Officer);
    assert!(alpha.hq().is_some());
    assert_eq!(
        teams
            .lookup_at("overworld", Vec3::new(5.0, 70.0, 5.0))
            .map(|team| team.id().to_owned()),
        Some(alpha_id)
    );
    assert!(teams.check_consistency().is_ok());
}

#[tokio::test]
async fn outsiders_capture_a_koth_and_everyone_hears_about_it() {
    let store = MemoryRepository::<TeamEntity>::new();
    let chat = Arc::new(Chat::default());
    let teams = teams_over(&store, chat.clone());
    let world = World::default();

    teams.create_player_team("P1", "Alpha").await.unwrap();
    let castle = teams.create_system_team("Castle").await.unwrap();
    let zone = Region::new(Vec3::new(100.0, 0.0, 100.0), Vec3::new(110.0, 20.0, 110.0));
    teams
        .attach_koth(
            castle.tracker().id(),
            KothTick::new("overworld", zone, Duration::from_secs(30)),
        )
        .unwrap();

    // Lone wolves outside any team never start a capture.
    world.stand("P9", Vec3::new(105.0, 5.0, 105.0));
    let start = Instant::now();
    assert!(teams.do_tick_at(SystemTime::now(), start, &world).is_empty());

    world.stand("P1", Vec3::new(104.0, 5.0, 104.0));
    let events = teams.do_tick_at(SystemTime::now(), start, &world);
    assert!(matches!(
        events.as_slice(),
        [TickEvent::Koth { event: KothEvent::CaptureStarted { by }, .. }] if by == "P1"
    ));

    let events = teams.do_tick_at(SystemTime::now(), start + Duration::from_secs(30), &world);
    for event in &events {
        teams.announce(event);
    }
    assert!(matches!(
        castle.koth().map(|koth| koth.state().clone()),
        Some(KothState::Held { .. })
    ));
    assert!(chat.saw("P1", "Castle has been captured by Alpha."));

    teams.reset_koth(castle.tracker().id()).unwrap();
    assert!(castle.has_active_koth());
}

#[tokio::test]
async fn death_freezes_the_team_until_a_tick_after_the_deadline() {
    let store = MemoryRepository::<TeamEntity>::new();
    let teams = teams_over(&store, Arc::new(Chat::default()));
    let users = UserService::new(
        Arc::new(MemoryRepository::<UserEntity>::new()),
        Arc::new(AppConfig::default()),
    );
    let alpha = teams.create_player_team("P1", "Alpha").await.unwrap();
    users.handle_join(&player("P1", "Steve")).await.unwrap();

    users.handle_death(&teams, "P1", None).unwrap();
    assert!(alpha.is_frozen());
    let world = World::default();

    let events = teams.do_tick_at(SystemTime::now(), Instant::now(), &world);
    assert!(events.is_empty());
    assert!(alpha.is_frozen());

    let later = SystemTime::now() + Duration::from_secs(121);
    let events = teams.do_tick_at(later, Instant::now(), &world);
    assert_eq!(
        events,
        vec![TickEvent::DtrThawed {
            team_id: alpha.tracker().id().to_owned()
        }]
    );
    assert!(!alpha.is_frozen());
}

#[tokio::test]
async fn storage_outage_surfaces_as_a_retry_later_message() {
    let store = MemoryRepository::<TeamEntity>::new();
    let teams = teams_over(&store, Arc::new(Chat::default()));
    store.set_available(false);

    let err = teams.create_player_team("P1", "Alpha").await.unwrap_err();
    assert!(matches!(err, ServiceError::Persistence(_)));
    assert_eq!(
        err.user_message(),
        "Something went wrong while saving, please try again later."
    );
    assert!(teams.is_empty());
    assert!(teams.lookup_by_member("P1").unwrap().is_none());
}
