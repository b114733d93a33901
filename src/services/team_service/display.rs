use super::TeamService;
use crate::team::{Role, Team};

impl TeamService {
    /// Name of `team` as `viewer` should see it.
    ///
    /// A `display_name` option wins outright. Otherwise the name is coloured by the viewer's
    /// relation to the team: member, invited or outsider. System teams always use the system
    /// colour.
    pub fn display_name(&self, viewer: &str, team: &Team) -> String {
        if let Some(name) = team.tracker().display_name() {
            return name;
        }

        let display = &self.config.display;
        let colour = match team {
            Team::System(_) => &display.system_colour,
            Team::Player(player) if player.member(viewer) != Role::Undefined => {
                &display.friendly_colour
            }
            Team::Player(player) if player.has_invite(viewer) => &display.invited_colour,
            Team::Player(_) => &display.enemy_colour,
        };
        format!("{colour}{}", team.name())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        team::{Team, tracker::DISPLAY_NAME},
        testing::{harness, session},
    };

    #[tokio::test]
    async fn colour_follows_the_viewer_relation() {
        let h = harness();
        let alpha = h.service.create_player_team("P1", "Alpha").await.unwrap();
        h.service
            .invite(&session("P1", "Steve"), &session("P2", "Alex"))
            .unwrap();
        let team = Team::Player(alpha);

        assert_eq!(h.service.display_name("P1", &team), "§aAlpha");
        assert_eq!(h.service.display_name("P2", &team), "§eAlpha");
        assert_eq!(h.service.display_name("P3", &team), "§cAlpha");
    }

    #[tokio::test]
    async fn override_wins_for_every_viewer() {
        let h = harness();
        let spawn = h.service.create_system_team("Spawn").await.unwrap();
        let team = Team::System(spawn.clone());
        assert_eq!(h.service.display_name("P1", &team), "§cSpawn");

        spawn.tracker().set_option(DISPLAY_NAME, json!("§6Spawn"));
        assert_eq!(h.service.display_name("P1", &team), "§6Spawn");
    }
}
