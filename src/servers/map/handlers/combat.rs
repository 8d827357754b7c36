//! Attack requests. Resolution happens in the combat system on its tick.

use std::sync::Arc;

use crate::game::{AttackKind, AttackRequest};
use crate::network::PacketReader;
use crate::session::Session;

use super::super::GameServer;

/// `C_ATTACK` / `C_FAR_ATTACK [D target][H x][H y]`.
pub async fn attack(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>, ranged: bool) {
    let target = r.read_d();
    let _x = r.read_h();
    let _y = r.read_h();
    if target == 0 {
        return;
    }

    let mut w = srv.world.lock().await;
    let Some(p) = w.player(sess.id) else { return };
    if !p.is_alive() || p.is_frozen() {
        return;
    }
    let kind = if ranged { AttackKind::Ranged } else { AttackKind::Melee };
    w.attacks.push_back(AttackRequest { session_id: sess.id, target, kind });
}
