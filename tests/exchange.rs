extern crate nalgebra as na;

use std::collections::{HashMap, HashSet};

use approx::assert_relative_eq;
use cellmd::cells::LinkedCells;
use cellmd::math::box_distance_squared;
use cellmd::molecules::{lattice_molecules, Component, ComponentTable, LatticeStyle, Molecule};
use cellmd::parallel::{CommunicationPartner, Communicator, DomainDecomposition, LocalCluster, PartnerRegion, ProcessGrid};
use cellmd::processors::{LennardJonesProcessor, PairCountProcessor};
use cellmd::simulation_box::SimulationBox;
use cellmd::traversals::{CellPairTraversal, TraversalKind};
use na::{UnitQuaternion, Vector3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn add_owned(grid: &mut LinkedCells, molecules: &[Molecule]) {
    for molecule in molecules {
        if grid.is_owned_position(&molecule.position()) {
            grid.add_particle(molecule.clone(), true).unwrap();
        }
    }
}

#[test]
fn single_rank_open_box_has_no_halo() {
    let sim_box = SimulationBox::new([10.0; 3], [false; 3]).unwrap();
    let mut molecules = Vec::new();
    for &z in &[2.5, 7.5] {
        for &y in &[2.5, 7.5] {
            for &x in &[2.5, 7.5] {
                molecules.push(Molecule::at(molecules.len() as u64, [x, y, z]));
            }
        }
    }

    let results = LocalCluster::run(1, |comm| {
        let mut dd = DomainDecomposition::new(comm, sim_box.clone(), 2.5, 0.0)?;
        let mut grid = dd.create_container(1)?;
        add_owned(&mut grid, &molecules);
        dd.exchange_halo(&mut grid)?;

        let mut traversal = TraversalKind::from_name("original").unwrap();
        traversal.rebuild(grid.cells(), grid.geometry())?;
        let mut processor = PairCountProcessor::new(2.5);
        traversal.traverse_cell_pairs(&mut grid, &mut processor)?;
        Ok((grid, processor))
    })
    .unwrap();
    let (grid, processor) = &results[0];

    assert_eq!(grid.num_owned_molecules(), 8);
    assert_eq!(grid.num_halo_molecules(), 0);
    assert!(grid.cells().iter().all(|c| c.len() <= 1));
    assert_eq!(processor.pairs_in_cutoff(), 0);

    // every cell on its own plus every pair of cells closer than the cutoff
    let interaction2 = 2.5 * 2.5;
    let cells = grid.cells();
    let mut expected = HashSet::new();
    for i in 0..cells.len() {
        expected.insert((i, i));
        for j in (i + 1)..cells.len() {
            let d2 = box_distance_squared(cells[i].box_min(), cells[i].box_max(), cells[j].box_min(), cells[j].box_max());
            if d2 < interaction2 {
                expected.insert((i, j));
            }
        }
    }
    let visited = processor.visited_cell_pairs();
    let distinct: HashSet<(usize, usize)> = visited.iter().copied().collect();
    assert_eq!(distinct.len(), visited.len());
    assert_eq!(distinct, expected);
}

#[test]
fn neighbour_receives_a_copy_across_the_split_plane() {
    let sim_box = SimulationBox::new([10.0; 3], [false; 3]).unwrap();
    let molecules = vec![Molecule::at(7, [5.1, 5.0, 5.0])];

    let views = LocalCluster::run(2, |comm| {
        let rank = comm.rank();
        let process_grid = ProcessGrid::with_dims(&sim_box, [2, 1, 1], rank)?;
        let mut dd = DomainDecomposition::with_process_grid(comm, sim_box.clone(), process_grid, 2.5, 0.3)?;
        let mut grid = dd.create_container(1)?;
        add_owned(&mut grid, &molecules);
        dd.exchange_halo(&mut grid)?;
        let owned: Vec<u64> = grid.owned_molecules().map(|m| m.id).collect();
        let halo: Vec<(u64, [f64; 3])> = grid.halo_molecules().map(|m| (m.id, m.position())).collect();
        Ok((owned, halo))
    })
    .unwrap();

    assert_eq!(views[0].0, Vec::<u64>::new());
    assert_eq!(views[0].1, vec![(7, [5.1, 5.0, 5.0])]);
    assert_eq!(views[1].0, vec![7]);
    assert!(views[1].1.is_empty());
}

#[test]
fn periodic_copy_arrives_shifted() {
    let sim_box = SimulationBox::periodic([10.0; 3]).unwrap();
    let molecules = vec![Molecule::at(3, [9.0, 5.0, 5.0])];

    let halos = LocalCluster::run(5, |comm| {
        let rank = comm.rank();
        let process_grid = ProcessGrid::with_dims(&sim_box, [5, 1, 1], rank)?;
        let mut dd = DomainDecomposition::with_process_grid(comm, sim_box.clone(), process_grid, 1.5, 0.0)?;
        let mut grid = dd.create_container(1)?;
        add_owned(&mut grid, &molecules);
        dd.exchange_halo(&mut grid)?;
        Ok(grid.halo_molecules().map(|m| (m.id, m.position())).collect::<Vec<_>>())
    })
    .unwrap();

    assert_eq!(halos[0].len(), 1);
    assert_eq!(halos[0][0].0, 3);
    assert_relative_eq!(halos[0][0].1[0], -1.0, epsilon = 1e-12);
    assert_eq!(halos[0][0].1[1], 5.0);
    // rank 3 sees it across the plane at 8
    assert_eq!(halos[3].len(), 1);
    assert_relative_eq!(halos[3][0].1[0], 9.0);
    assert!(halos[1].is_empty() && halos[2].is_empty() && halos[4].is_empty());
}

#[test]
fn halo_partners_mirror_each_other() {
    let sim_box = SimulationBox::periodic([10.0, 10.0, 6.0]).unwrap();
    let partners = LocalCluster::run(4, |comm| {
        let rank = comm.rank();
        let process_grid = ProcessGrid::with_dims(&sim_box, [2, 2, 1], rank)?;
        let mut dd = DomainDecomposition::with_process_grid(comm, sim_box.clone(), process_grid, 2.5, 0.3)?;
        dd.create_container(1)?;
        let flatten = |list: &[CommunicationPartner]| -> Vec<(usize, Vec<PartnerRegion>)> {
            list.iter().map(|p| (p.rank(), p.regions().to_vec())).collect()
        };
        Ok((flatten(&dd.halo_partners().send), flatten(&dd.halo_partners().receive)))
    })
    .unwrap();

    for (a, (send, _)) in partners.iter().enumerate() {
        assert!(!send.is_empty());
        for (b, sent) in send {
            let (_, receive) = &partners[*b];
            let (_, received) = receive
                .iter()
                .find(|(source, _)| *source == a)
                .unwrap_or_else(|| panic!("rank {b} does not expect anything from {a}"));
            assert_eq!(sent.len(), received.len());
            for (out, inc) in sent.iter().zip(received) {
                assert_eq!(out.region.shifted(&out.shift), inc.region);
                assert_eq!(inc.shift.map(|s| -s), out.shift);
            }
        }
    }
}

#[test]
fn migration_moves_every_molecule_to_one_owner() {
    let sim_box = SimulationBox::periodic([10.0; 3]).unwrap();
    let mut molecules = lattice_molecules(LatticeStyle::SimpleCubic, 1.0, [10, 10, 10], 0, 1);
    for molecule in molecules.iter_mut() {
        let t = molecule.id as f64;
        molecule.v = Vector3::new(t, -t, 0.5 * t);
        molecule.q = UnitQuaternion::from_euler_angles(0.01 * t, 0.2, -0.3);
    }
    // each molecule drifts at most 0.45 per axis, some of them through the periodic faces
    let drift = |id: u64| {
        Vector3::new(
            0.45 * ((id % 3) as f64 - 1.0),
            -0.45 * ((id % 5) as f64 / 4.0),
            0.3 * ((id % 2) as f64),
        )
    };

    let owned = LocalCluster::run(4, |comm| {
        let mut dd = DomainDecomposition::new(comm, sim_box.clone(), 2.5, 0.3)?;
        let mut grid = dd.create_container(1)?;
        add_owned(&mut grid, &molecules);
        grid.for_each_owned_mut(|m| m.r += drift(m.id));
        grid.update()?;
        dd.migrate(&mut grid)?;
        let mine: Vec<Molecule> = grid.owned_molecules().cloned().collect();
        let inside = mine.iter().all(|m| grid.is_owned_position(&m.position()));
        Ok((grid.num_halo_molecules(), inside, mine))
    })
    .unwrap();

    let mut seen: HashMap<u64, Molecule> = HashMap::new();
    for (halo, inside, mine) in owned {
        assert_eq!(halo, 0);
        assert!(inside);
        for molecule in mine {
            assert!(seen.insert(molecule.id, molecule).is_none(), "owned twice");
        }
    }
    assert_eq!(seen.len(), molecules.len());
    for original in &molecules {
        let moved = &seen[&original.id];
        let mut expected = original.r + drift(original.id);
        sim_box.wrap_position(&mut expected);
        for d in 0..3 {
            assert_relative_eq!(moved.r[d], expected[d], epsilon = 1e-12);
        }
        assert_eq!(moved.v, original.v);
        assert_eq!(moved.q, original.q);
    }
}

fn macroscopic_pairs(ranks: usize, sim_box: &SimulationBox, molecules: &[Molecule], cutoff: f64) -> u64 {
    let counts = LocalCluster::run(ranks, |comm| {
        let mut dd = DomainDecomposition::new(comm, sim_box.clone(), cutoff, 0.0)?;
        let mut grid = dd.create_container(1)?;
        add_owned(&mut grid, molecules);
        dd.exchange_halo(&mut grid)?;
        let mut traversal = TraversalKind::from_name("sliced").unwrap();
        traversal.rebuild(grid.cells(), grid.geometry())?;
        let mut processor = PairCountProcessor::new(cutoff);
        traversal.traverse_cell_pairs(&mut grid, &mut processor)?;
        let total = dd.global_count(&[processor.macroscopic_pairs() as u64])?;
        Ok(total[0])
    })
    .unwrap();
    assert!(counts.iter().all(|c| *c == counts[0]));
    counts[0]
}

#[test]
fn pair_count_does_not_depend_on_the_rank_count() {
    let sim_box = SimulationBox::periodic([10.0; 3]).unwrap();
    let cutoff = 2.5;
    let mut rng = SmallRng::seed_from_u64(17);
    let molecules: Vec<Molecule> = (0..300)
        .map(|id| Molecule::at(id, [rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0)]))
        .collect();

    let mut brute_force = 0u64;
    for i in 0..molecules.len() {
        for j in (i + 1)..molecules.len() {
            let rij = sim_box.minimum_image(&(molecules[i].r - molecules[j].r));
            if rij.norm_squared() < cutoff * cutoff {
                brute_force += 1;
            }
        }
    }

    assert_eq!(macroscopic_pairs(1, &sim_box, &molecules, cutoff), brute_force);
    assert_eq!(macroscopic_pairs(2, &sim_box, &molecules, cutoff), brute_force);
    assert_eq!(macroscopic_pairs(4, &sim_box, &molecules, cutoff), brute_force);
}

#[test]
fn overlapping_step_matches_the_plain_step() {
    let sim_box = SimulationBox::periodic([12.8; 3]).unwrap();
    let components = ComponentTable::new(vec![Component::single_site(0, 1.0, 1.0, 1.0)]);
    let molecules = lattice_molecules(LatticeStyle::Fcc, 1.6, [8, 8, 8], 0, 1);

    let energies = LocalCluster::run(2, |comm| {
        let mut dd = DomainDecomposition::new(comm, sim_box.clone(), 2.5, 0.2)?;
        let mut grid = dd.create_container(2)?;
        add_owned(&mut grid, &molecules);
        let mut traversal = TraversalKind::from_name("c08").unwrap();
        traversal.rebuild(grid.cells(), grid.geometry())?;

        dd.exchange_halo(&mut grid)?;
        grid.update_molecule_caches(&components)?;
        let mut plain = LennardJonesProcessor::new(2.5, true);
        traversal.traverse_cell_pairs(&mut grid, &mut plain)?;
        grid.delete_outer_particles();

        let mut overlapped = LennardJonesProcessor::new(2.5, true);
        dd.perform_overlapping_step(&mut grid, &traversal, &mut overlapped, &components, 3)?;
        dd.global_sum(&[plain.upot(), overlapped.upot()])
    })
    .unwrap();

    assert_eq!(energies[0], energies[1]);
    let [plain, overlapped] = [energies[0][0], energies[0][1]];
    assert!(plain < 0.0);
    assert_relative_eq!(plain, overlapped, max_relative = 1e-9);
}
