// rust/recovery-drill/src/drill.rs

//! The recovery drill: checkpoint on a ring, lose one rank, rebuild it from
//! its partner and compare checksums.

use std::hash::Hasher;
use std::thread;

use resilience_core::wire::BufferEntryPacket;
use resilience_core::{
    BufferEntry, Communicator, Datatype, GroupEntry, GroupTable, LocalEndpoint, LocalFabric,
    RecoveryContext, ResilienceConfig, ResilienceError, Result, TagKind, Transport, WirePacket,
};
use twox_hash::XxHash64;

const GROUP_ID: i32 = 1;
const FIRST_MEMBER_ID: i32 = 100;
const ELEMENT_SIZE: i32 = 8;

/// Replica traffic runs on its own communicator so it never interleaves with
/// recovery messages.
const REPLICATION: Communicator = Communicator(1);

type DrillResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// What the drill should simulate.
#[derive(Debug, Clone)]
pub struct DrillPlan {
    pub ranks: usize,
    pub members: usize,
    pub elements: usize,
    pub rounds: usize,
    pub victim: usize,
}

/// Outcome of a successful drill.
#[derive(Debug, Clone, Default)]
pub struct DrillReport {
    pub survivor: i32,
    pub members_verified: usize,
    pub versions_restored: usize,
    pub bytes_restored: usize,
}

impl DrillPlan {
    pub fn validate(&self) -> DrillResult<()> {
        if self.ranks < 2 {
            return Err("the drill needs at least 2 ranks".into());
        }
        if self.victim >= self.ranks {
            return Err(format!(
                "victim rank {} is outside a ring of {} ranks",
                self.victim, self.ranks
            )
            .into());
        }
        if self.members == 0 || self.elements == 0 || self.rounds == 0 {
            return Err("members, elements and rounds must all be greater than 0".into());
        }
        Ok(())
    }
}

struct RankState {
    ctx: RecoveryContext<LocalEndpoint>,
    groups: GroupTable,
}

impl RankState {
    fn new(endpoint: LocalEndpoint, config: &ResilienceConfig, plan: &DrillPlan) -> Result<Self> {
        let rank = endpoint.rank();
        let ctx = RecoveryContext::new(
            endpoint,
            config.exchange.tag_space()?,
            Communicator::WORLD,
        )?;

        let mut group = GroupEntry::new(
            GROUP_ID,
            Communicator::WORLD,
            0,
            config.topology.depth,
            config.topology.rank_separation,
        )?;
        group.refresh_topology(ctx.transport())?;
        for member_id in member_ids(plan.members) {
            group.add_member(
                member_id,
                Datatype::DOUBLE,
                ELEMENT_SIZE,
                member_data(rank, member_id, 0, plan.elements),
            )?;
        }

        let mut groups = GroupTable::new();
        groups.insert(group)?;
        Ok(Self { ctx, groups })
    }

    fn group(&self) -> Result<&GroupEntry> {
        self.groups
            .get(GROUP_ID)
            .ok_or_else(|| ResilienceError::protocol(format!("group {GROUP_ID} is missing")))
    }

    /// One checkpoint round: refresh every member, ship it to the
    /// out-partner and keep the in-partner's copy as the replica.
    fn checkpoint(&mut self, round: usize, elements: usize) -> Result<()> {
        let rank = self.ctx.rank();
        let tags = *self.ctx.tags();
        let transport = self.ctx.transport();
        let group = self
            .groups
            .get_mut(GROUP_ID)
            .ok_or_else(|| ResilienceError::protocol(format!("group {GROUP_ID} is missing")))?;
        let topology = group
            .topology
            .ok_or_else(|| ResilienceError::topology("group has no partners yet"))?;
        group.current_timestamp += 1;

        for (index, member) in group.members.slots_mut().iter_mut().enumerate() {
            if !member.is_occupied() {
                continue;
            }
            member.data = member_data(rank, member.member_id, round, elements);

            let size_tag = tags.tag(TagKind::Size, index)?;
            let data_tag = tags.tag(TagKind::Data, index)?;
            let outgoing = BufferEntry::new(
                member.datatype,
                member.datatype_size,
                member.data.clone(),
                rank,
            )?;
            transport.send(
                topology.out_rank,
                size_tag,
                REPLICATION,
                &outgoing.header().to_bytes(),
            )?;
            transport.send(topology.out_rank, data_tag, REPLICATION, outgoing.data())?;

            let mut header = [0u8; BufferEntryPacket::SIZE];
            transport.recv(topology.in_rank, size_tag, REPLICATION, &mut header)?;
            let header = BufferEntryPacket::from_bytes(&header)?;
            let mut replica = BufferEntry::allocate(&header, topology.in_rank)?;
            transport.recv(topology.in_rank, data_tag, REPLICATION, replica.data_mut())?;

            member.snapshot(replica)?;
        }
        Ok(())
    }
}

fn member_ids(members: usize) -> impl Iterator<Item = i32> {
    (FIRST_MEMBER_ID..).take(members)
}

/// Deterministic contents for `member` on `rank` in checkpoint `round`.
fn member_data(rank: i32, member_id: i32, round: usize, elements: usize) -> Vec<u8> {
    (0..elements)
        .flat_map(|i| {
            let value = f64::from(rank) * 1.0e6
                + f64::from(member_id) * 1.0e3
                + round as f64
                + i as f64 * 0.5;
            value.to_ne_bytes()
        })
        .collect()
}

pub fn checksum(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}

/// Two distinct mutable elements of `items`.
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> Option<(&mut T, &mut T)> {
    if a == b || a >= items.len() || b >= items.len() {
        return None;
    }
    if a < b {
        let (low, high) = items.split_at_mut(b);
        Some((&mut low[a], &mut high[0]))
    } else {
        let (low, high) = items.split_at_mut(a);
        Some((&mut high[0], &mut low[b]))
    }
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, Result<T>>) -> DrillResult<T> {
    match handle.join() {
        Ok(result) => Ok(result?),
        Err(_) => Err("rank thread panicked".into()),
    }
}

/// Runs the whole drill on an in-process fabric.
pub fn run(plan: &DrillPlan, config: &ResilienceConfig) -> DrillResult<DrillReport> {
    plan.validate()?;

    let endpoints = LocalFabric::from_config(&config.transport).connect(plan.ranks)?;
    let mut states = endpoints
        .into_iter()
        .map(|endpoint| RankState::new(endpoint, config, plan))
        .collect::<Result<Vec<_>>>()?;
    tracing::info!(
        ranks = plan.ranks,
        members = plan.members,
        elements = plan.elements,
        "ranks initialized"
    );

    for round in 1..=plan.rounds {
        let results: Vec<DrillResult<()>> = thread::scope(|s| {
            let handles: Vec<_> = states
                .iter_mut()
                .map(|state| s.spawn(move || state.checkpoint(round, plan.elements)))
                .collect();
            handles.into_iter().map(join).collect()
        });
        results.into_iter().collect::<DrillResult<Vec<()>>>()?;
        tracing::info!(round, "checkpoint round complete");
    }

    let victim_rank = i32::try_from(plan.victim)?;
    let survivor_rank = states[plan.victim]
        .group()?
        .topology
        .map(|t| t.out_rank)
        .ok_or("victim has no partner topology")?;
    let expected: Vec<(i32, u64)> = states[plan.victim]
        .group()?
        .members
        .slots()
        .iter()
        .filter(|m| m.is_occupied())
        .map(|m| (m.member_id, checksum(&m.data)))
        .collect();

    states[plan.victim].groups = GroupTable::new();
    tracing::info!(victim = victim_rank, survivor = survivor_rank, "rank state discarded");

    let survivor_index = usize::try_from(survivor_rank)?;
    let (survivor, victim) =
        pair_mut(&mut states, survivor_index, plan.victim).ok_or("victim is its own partner")?;

    let (sent, received) = thread::scope(|s| {
        let sender = s.spawn(move || -> Result<()> {
            survivor.ctx.send_group_table(victim_rank, &survivor.groups)?;
            for group in survivor.groups.slots() {
                survivor.ctx.send_group(victim_rank, group)?;
            }
            Ok(())
        });
        let receiver = s.spawn(move || -> Result<()> {
            victim.ctx.recv_group_table(survivor_rank, &mut victim.groups)?;
            for group in victim.groups.slots_mut() {
                victim.ctx.recv_group(survivor_rank, group)?;
                if group.is_occupied() {
                    group.refresh_topology(victim.ctx.transport())?;
                }
            }
            Ok(())
        });
        (join(sender), join(receiver))
    });
    sent?;
    received?;

    let group = states[plan.victim]
        .groups
        .get_mut(GROUP_ID)
        .ok_or("recovered rank is missing its group")?;
    let mut report = DrillReport {
        survivor: survivor_rank,
        ..Default::default()
    };

    for (member_id, want) in expected {
        let member = group
            .members
            .get_mut(member_id)
            .ok_or_else(|| format!("member {member_id} was not recovered"))?;
        if !member.restore_latest() {
            return Err(format!("member {member_id} came back without versions").into());
        }

        let got = checksum(&member.data);
        if got != want {
            return Err(format!(
                "member {member_id}: checksum {got:#018x} does not match {want:#018x}"
            )
            .into());
        }
        tracing::debug!(member_id, checksum = got, "member verified");

        report.members_verified += 1;
        report.versions_restored += member.version.count();
        report.bytes_restored += member.data.len();
    }

    Ok(report)
}
