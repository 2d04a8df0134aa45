// SPDX-License-Identifier: MPL-2.0

//! Multi-threaded renames.

mod common;

use std::{sync::Arc, thread};

use common::{mode, mount, names, root_ctx};
use tagfs::Errno;

const ROUNDS: usize = 2000;

#[test]
fn opposite_renames_do_not_deadlock() {
    let (fs, root) = mount("");
    let ctx = root_ctx();
    let a = fs.mkdir(&root, "A", mode(0o755), &ctx).unwrap();
    let b = fs.mkdir(&root, "B", mode(0o755), &ctx).unwrap();
    let x = fs.create(&a, "x", mode(0o644), &ctx).unwrap();

    let forward = {
        let (fs, a, b) = (fs.clone(), a.clone(), b.clone());
        thread::spawn(move || {
            let mut moved = 0;
            for _ in 0..ROUNDS {
                match fs.rename(&a, "x", &b, "y") {
                    Ok(()) => moved += 1,
                    Err(e) => assert_eq!(e.error(), Errno::ENOENT),
                }
            }
            moved
        })
    };
    let backward = {
        let (fs, a, b) = (fs.clone(), a.clone(), b.clone());
        thread::spawn(move || {
            let mut moved = 0;
            for _ in 0..ROUNDS {
                match fs.rename(&b, "y", &a, "x") {
                    Ok(()) => moved += 1,
                    Err(e) => assert_eq!(e.error(), Errno::ENOENT),
                }
            }
            moved
        })
    };
    let forward: usize = forward.join().unwrap();
    let backward: usize = backward.join().unwrap();

    // Successful moves alternate, so the last one decides where `x` is.
    let in_a = names(&fs, &a);
    let in_b = names(&fs, &b);
    if forward == backward {
        assert_eq!((in_a, in_b), (vec![String::from("x")], vec![]));
    } else {
        assert_eq!(forward, backward + 1);
        assert_eq!((in_a, in_b), (vec![], vec![String::from("y")]));
    }
    assert_eq!(x.metadata().nlinks, 1);
    assert_eq!(fs.live_nodes(), 4);
}

#[test]
fn directory_shuffle_keeps_the_tree_consistent() {
    let (fs, root) = mount("");
    let ctx = root_ctx();
    let parents: Vec<_> = (0..3)
        .map(|i| fs.mkdir(&root, &format!("p{i}"), mode(0o755), &ctx).unwrap())
        .collect();
    for (i, parent) in parents.iter().enumerate() {
        let child = fs.mkdir(parent, &format!("c{i}"), mode(0o755), &ctx).unwrap();
        fs.create(&child, "leaf", mode(0o644), &ctx).unwrap();
    }
    let parents = Arc::new(parents);

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let (fs, parents) = (fs.clone(), parents.clone());
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    let child = format!("c{}", (worker + round) % 3);
                    let from = &parents[round % 3];
                    let to = &parents[(round + worker + 1) % 3];
                    match fs.rename(from, &child, to, &child) {
                        Ok(()) => {}
                        Err(e) => assert_eq!(e.error(), Errno::ENOENT),
                    }
                    // Readers see each child somewhere, never half-moved.
                    if let Ok(moved) = fs.lookup(to, &child) {
                        assert!(fs.lookup(&moved, "leaf").is_ok());
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    // Every child is in exactly one parent and parent link counts add up.
    let mut seen = Vec::new();
    for parent in parents.iter() {
        let children = names(&fs, parent);
        assert_eq!(parent.metadata().nlinks, 2 + children.len());
        for child in children {
            let node = fs.lookup(parent, &child).unwrap();
            assert_eq!(fs.lookup(&node, "..").unwrap().ino(), parent.ino());
            assert_eq!(names(&fs, &node), vec!["leaf"]);
            seen.push(child);
        }
    }
    seen.sort();
    assert_eq!(seen, vec!["c0", "c1", "c2"]);
    assert_eq!(fs.live_nodes(), 1 + 3 + 3 + 3);
}
