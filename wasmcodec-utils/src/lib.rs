/// An insertion-ordered collection that hands out a stable id for every
/// appended element.
///
/// Ids come from a counter and are never reused, so an id keeps naming the
/// same element even after other elements have been removed. The position of
/// an element (its index in iteration order) can change, its id can not.
#[derive(Clone, Debug)]
pub struct IdAppendVec<T> {
    counter: u32,
    data: Vec<(u32, T)>,
}

impl<T> Default for IdAppendVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Two collections are equal if they hold equal elements under equal ids in
/// the same order. The internal counter is not compared.
impl<T: PartialEq> PartialEq for IdAppendVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<T> IdAppendVec<T> {
    pub fn new() -> Self {
        Self {
            counter: 0,
            data: Vec::new(),
        }
    }

    pub fn append(&mut self, t: T) -> u32 {
        let c = self.counter;
        self.counter += 1;
        self.data.push((c, t));
        c
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.data.iter().find(|(i, _)| *i == id).map(|(_, t)| t)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.data.iter_mut().find(|(i, _)| *i == id).map(|(_, t)| t)
    }

    pub fn remove(&mut self, id: u32) -> Option<T> {
        let pos = self.position(id)?;
        Some(self.data.remove(pos).1)
    }

    /// Linear search for the current position of `id`.
    pub fn position(&self, id: u32) -> Option<usize> {
        self.data.iter().position(|(i, _)| *i == id)
    }

    /// The element at position `index`, together with its id.
    pub fn at(&self, index: usize) -> Option<(u32, &T)> {
        self.data.get(index).map(|(i, t)| (*i, t))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.data.iter().map(|(i, t)| (*i, t))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> + '_ {
        self.data.iter_mut().map(|(i, t)| (*i, t))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.data.iter().map(|(_, t)| t)
    }
}

impl<T> std::iter::FromIterator<T> for IdAppendVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut v = Self::new();
        for t in iter {
            v.append(t);
        }
        v
    }
}

pub trait NamedLookup<Element> {
    fn lookup(&self, name: &str) -> Option<Element>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_survive_removal() {
        let mut v = IdAppendVec::new();
        let a = v.append("a");
        let b = v.append("b");
        let c = v.append("c");
        assert_eq!((a, b, c), (0, 1, 2));

        assert_eq!(v.remove(b), Some("b"));
        assert_eq!(v.position(c), Some(1));
        assert_eq!(v.get(c), Some(&"c"));
        assert_eq!(v.get(b), None);

        let d = v.append("d");
        assert_eq!(d, 3);
        assert_eq!(v.at(2), Some((3, &"d")));
    }

    #[test]
    fn equality_ignores_counter() {
        let mut a = IdAppendVec::new();
        a.append(1);
        let mut b = IdAppendVec::new();
        b.append(1);
        let tmp = b.append(2);
        b.remove(tmp);
        assert_eq!(a, b);
    }
}
