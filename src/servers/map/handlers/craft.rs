//! NPC crafting: a dialog action that matches a recipe trades materials for
//! products. Recipes that allow batches ask for an amount first.

use std::sync::Arc;

use crate::database::craft_db::CraftRecipe;
use crate::game::aoi::chebyshev;
use crate::game::inventory::{is_stackable, MAX_INVENTORY_SIZE};
use crate::game::player::Player;
use crate::game::World;
use crate::network::PacketReader;
use crate::session::Session;

use super::super::{packets, GameServer};
use super::npc::TALK_RANGE;
use super::{give_item, send_msg, send_removal, MSG_INVENTORY_FULL, MSG_OVERWEIGHT};

const MSG_SHORT_OF: u16 = 337;
const MSG_RECEIVED_FROM: u16 = 143;

fn unequipped_count(p: &Player, item_id: i32) -> i32 {
    p.inventory.iter().filter(|i| i.item_id == item_id && !i.equipped).map(|i| i.count).sum()
}

/// How many full sets of materials the player carries.
fn sets_available(p: &Player, recipe: &CraftRecipe) -> i32 {
    recipe.materials.iter().map(|m| unequipped_count(p, m.item_id) / m.amount).min().unwrap_or(0)
}

/// Names the first material the player is short of for `amount` sets.
fn report_shortfall(p: &Player, srv: &GameServer, recipe: &CraftRecipe, amount: i32) -> bool {
    for m in &recipe.materials {
        let need = m.amount.saturating_mul(amount);
        let have = unequipped_count(p, m.item_id);
        if have < need {
            let name = srv.data.items.get(m.item_id).map(|t| t.name.as_str()).unwrap_or("?");
            let arg = format!("{} ({})", name, need - have);
            p.outbox.send(packets::message_code(MSG_SHORT_OF, &[arg.as_str()]));
            return true;
        }
    }
    false
}

/// Runs `recipe` from the dialog of NPC `npc_obj` (template `npc_id`).
pub(crate) fn entry(w: &mut World, srv: &GameServer, sid: u64, npc_obj: i32, npc_id: i32, recipe: &CraftRecipe) {
    if recipe.npc_id != 0 && recipe.npc_id != npc_id {
        tracing::debug!("[craft] [wrong_npc] action={} npc={}", recipe.action, npc_id);
        return;
    }
    let Some(p) = w.player_mut(sid) else { return };
    let sets = sets_available(p, recipe);
    if sets == 0 {
        report_shortfall(p, srv, recipe, 1);
        return;
    }
    if sets > 1 && recipe.amount_inputable {
        p.pending_craft = Some((npc_obj, recipe.action.clone()));
        p.outbox.send(packets::input_amount(npc_obj, sets, &recipe.action));
        return;
    }
    execute(w, srv, sid, npc_obj, recipe, 1);
}

/// Makes `amount` sets. Every check runs before anything is consumed.
pub(crate) fn execute(w: &mut World, srv: &GameServer, sid: u64, npc_obj: i32, recipe: &CraftRecipe, amount: i32) {
    let npc_name = w
        .npcs
        .get(&npc_obj)
        .and_then(|n| srv.data.npcs.get(n.npc_id))
        .map(|t| t.name.clone())
        .unwrap_or_default();
    let Some(p) = w.player(sid) else { return };
    if report_shortfall(p, srv, recipe, amount) {
        return;
    }

    let mut slots = 0usize;
    let mut weight = 0i32;
    for out in &recipe.items {
        let Some(tpl) = srv.data.items.get(out.item_id) else {
            tracing::warn!("[craft] [unknown_product] action={} item={}", recipe.action, out.item_id);
            return;
        };
        let count = out.amount.saturating_mul(amount);
        if is_stackable(tpl) {
            if p.inventory.find_by_item_id(tpl.item_id).is_none() {
                slots += 1;
            }
        } else {
            slots += usize::try_from(count).unwrap_or(usize::MAX);
        }
        weight = weight.saturating_add(count.saturating_mul(tpl.weight) / 1000);
    }
    if p.inventory.len().saturating_add(slots) > MAX_INVENTORY_SIZE {
        send_msg(p, MSG_INVENTORY_FULL);
        return;
    }
    if p.inventory.would_overweight(weight, p.max_weight()) {
        send_msg(p, MSG_OVERWEIGHT);
        return;
    }

    let Some(p) = w.player_mut(sid) else { return };
    for m in &recipe.materials {
        let mut left = m.amount.saturating_mul(amount);
        while left > 0 {
            let Some((obj_id, have)) =
                p.inventory.iter().find(|i| i.item_id == m.item_id && !i.equipped).map(|i| (i.obj_id, i.count))
            else {
                break;
            };
            let take = have.min(left);
            if let Some(r) = p.inventory.remove(obj_id, take) {
                send_removal(p, &r);
            }
            left -= take;
        }
    }
    p.mark_dirty();
    let char_id = p.char_id;

    for out in &recipe.items {
        let Some(tpl) = srv.data.items.get(out.item_id) else { continue };
        let count = out.amount.saturating_mul(amount);
        if is_stackable(tpl) {
            give_item(w, sid, tpl, count, 0);
        } else {
            for _ in 0..count {
                give_item(w, sid, tpl, 1, 0);
            }
        }
        if let Some(p) = w.player(sid) {
            p.outbox.send(packets::message_code(MSG_RECEIVED_FROM, &[npc_name.as_str(), tpl.name.as_str()]));
        }
    }
    tracing::info!("[craft] [made] char={} action={} sets={}", char_id, recipe.action, amount);
}

/// `C_HYPERTEXT_INPUT_RESULT [D npc][D amount][C][S action]`, the reply to
/// the batch amount dialog.
pub async fn amount(srv: &Arc<GameServer>, sess: &Arc<Session>, r: &mut PacketReader<'_>) {
    let npc_obj = r.read_d();
    let amount = r.read_d();
    let _ = r.read_c();
    let action = r.read_s();

    let mut w = srv.world.lock().await;
    let Some(p) = w.player_mut(sess.id) else { return };
    let Some((pending_npc, pending_action)) = p.pending_craft.take() else {
        tracing::debug!("[craft] [no_pending] char={}", p.char_id);
        return;
    };
    if amount <= 0 || pending_npc != npc_obj || p.dead {
        return;
    }
    let (map_id, x, y) = (p.map_id, p.x, p.y);
    let near = w.npcs.get(&npc_obj).is_some_and(|n| n.map_id == map_id && chebyshev(x, y, n.x, n.y) <= TALK_RANGE);
    if !near {
        return;
    }
    let recipe = srv.data.crafts.get(&action).or_else(|| srv.data.crafts.get(&pending_action));
    if let Some(recipe) = recipe {
        execute(&mut w, srv, sess.id, npc_obj, recipe, amount);
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::database::craft_db::CraftPart;
    use crate::database::NpcTemplate;
    use crate::game::ids::IdKind;
    use crate::game::npc::{Npc, SpawnAnchor};
    use crate::game::scripting::StdFormulas;
    use crate::network::opcodes::{C_HYPERTEXT_INPUT_RESULT, S_INPUT_AMOUNT, S_MESSAGE_CODE};
    use crate::network::PacketWriter;

    const SMITH: i32 = 70002;

    fn server() -> (Arc<GameServer>, Arc<crate::repo::MemoryStore>) {
        let mut data = data();
        data.npcs.insert(NpcTemplate { npc_id: SMITH, name: "Smith".into(), impl_type: "L1Merchant".into(), ..Default::default() });
        data.crafts.insert(CraftRecipe {
            action: "request sword".into(),
            npc_id: SMITH,
            amount_inputable: false,
            materials: vec![CraftPart { item_id: 40010, amount: 5 }],
            items: vec![CraftPart { item_id: 1, amount: 1 }],
        });
        data.crafts.insert(CraftRecipe {
            action: "request brew".into(),
            npc_id: 0,
            amount_inputable: true,
            materials: vec![CraftPart { item_id: 1, amount: 1 }],
            items: vec![CraftPart { item_id: 40010, amount: 10 }],
        });
        server_from(data, Arc::new(StdFormulas))
    }

    fn smith(w: &mut World, srv: &GameServer) -> i32 {
        let tpl = srv.data.npcs.get(SMITH).unwrap().clone();
        let id = w.ids.next(IdKind::Npc);
        let anchor = SpawnAnchor { map_id: 4, x: 32501, y: 32500, ..Default::default() };
        w.add_npc(Npc::from_template(id, &tpl, anchor, 32501, 32500))
    }

    #[tokio::test]
    async fn test_craft_consumes_materials() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (s, mut rx) = join(&mut w, 1, 32500, 32500);
        let npc = smith(&mut w, &srv);
        let potion = srv.data.items.get(40010).unwrap().clone();
        give(&mut w, s.id, &potion, 7);
        rx.drain();

        let recipe = srv.data.crafts.get("request sword").unwrap().clone();
        entry(&mut w, &srv, s.id, npc, SMITH, &recipe);
        let p = w.player(s.id).unwrap();
        assert_eq!(p.inventory.count_of(40010), 2);
        assert_eq!(p.inventory.count_of(1), 1);
        assert!(ops(&mut rx).contains(&S_MESSAGE_CODE));
    }

    #[tokio::test]
    async fn test_missing_material_names_shortfall() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (s, mut rx) = join(&mut w, 1, 32500, 32500);
        let npc = smith(&mut w, &srv);
        let potion = srv.data.items.get(40010).unwrap().clone();
        give(&mut w, s.id, &potion, 3);
        rx.drain();

        let recipe = srv.data.crafts.get("request sword").unwrap().clone();
        entry(&mut w, &srv, s.id, npc, SMITH, &recipe);
        assert_eq!(w.player(s.id).unwrap().inventory.count_of(40010), 3);
        let pkt = rx.try_recv().unwrap();
        assert_eq!(pkt[0], S_MESSAGE_CODE);
        assert_eq!(u16::from_le_bytes([pkt[1], pkt[2]]), MSG_SHORT_OF);
    }

    #[tokio::test]
    async fn test_other_npc_cannot_offer_bound_recipe() {
        let (srv, _store) = server();
        let mut w = srv.world.lock().await;
        let (s, _rx) = join(&mut w, 1, 32500, 32500);
        let npc = smith(&mut w, &srv);
        let potion = srv.data.items.get(40010).unwrap().clone();
        give(&mut w, s.id, &potion, 5);

        let recipe = srv.data.crafts.get("request sword").unwrap().clone();
        entry(&mut w, &srv, s.id, npc, 45001, &recipe);
        assert_eq!(w.player(s.id).unwrap().inventory.count_of(1), 0);
    }

    #[tokio::test]
    async fn test_batch_asks_amount_then_crafts() {
        let (srv, _store) = server();
        let (s, mut rx, npc) = {
            let mut w = srv.world.lock().await;
            let (s, rx) = join(&mut w, 1, 32500, 32500);
            let npc = smith(&mut w, &srv);
            let sword = srv.data.items.get(1).unwrap().clone();
            for _ in 0..3 {
                give(&mut w, s.id, &sword, 1);
            }
            let recipe = srv.data.crafts.get("request brew").unwrap().clone();
            entry(&mut w, &srv, s.id, npc, SMITH, &recipe);
            assert!(w.player(s.id).unwrap().pending_craft.is_some());
            (s, rx, npc)
        };
        assert!(ops(&mut rx).contains(&S_INPUT_AMOUNT));

        let pkt = PacketWriter::new(C_HYPERTEXT_INPUT_RESULT).d(npc).d(2).c(0).s("request brew").finish();
        amount(&srv, &s, &mut PacketReader::new(&pkt)).await;
        let w = srv.world.lock().await;
        let p = w.player(s.id).unwrap();
        assert_eq!(p.inventory.count_of(1), 1);
        assert_eq!(p.inventory.count_of(40010), 20);
        assert!(p.pending_craft.is_none());
    }

    #[tokio::test]
    async fn test_amount_without_pending_dialog_is_ignored() {
        let (srv, _store) = server();
        let (s, npc) = {
            let mut w = srv.world.lock().await;
            let (s, _rx) = join(&mut w, 1, 32500, 32500);
            let npc = smith(&mut w, &srv);
            let sword = srv.data.items.get(1).unwrap().clone();
            give(&mut w, s.id, &sword, 1);
            (s, npc)
        };
        let pkt = PacketWriter::new(C_HYPERTEXT_INPUT_RESULT).d(npc).d(1).c(0).s("request brew").finish();
        amount(&srv, &s, &mut PacketReader::new(&pkt)).await;
        let w = srv.world.lock().await;
        assert_eq!(w.player(s.id).unwrap().inventory.count_of(1), 1);
    }
}
